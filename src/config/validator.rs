//! Configuration validation

use super::*;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &JobConfig) -> Result<()> {
    validate_slices(&config.slices)?;
    validate_workload(&config.workload, config.slices.resolve())?;
    validate_control(&config.control)?;

    Ok(())
}

fn validate_slices(slices: &SlicesSetting) -> Result<()> {
    if *slices == SlicesSetting::Count(0) {
        anyhow::bail!("slices must be at least 1");
    }
    Ok(())
}

/// Validate workload configuration against the resolved slice count
pub fn validate_workload(workload: &WorkloadConfig, slices: usize) -> Result<()> {
    if workload.batch_size == 0 {
        anyhow::bail!("batch_size must be at least 1");
    }

    if !(0.0..=1.0).contains(&workload.version_conflict_rate) {
        anyhow::bail!(
            "version_conflict_rate must be between 0.0 and 1.0, got {}",
            workload.version_conflict_rate
        );
    }

    for &slice in &workload.failing_slices {
        if slice >= slices {
            anyhow::bail!(
                "failing slice {} does not exist in a job with {} slices",
                slice,
                slices
            );
        }
    }

    Ok(())
}

/// Validate mid-run control actions
pub fn validate_control(control: &ControlConfig) -> Result<()> {
    if control.status_interval_ms == 0 {
        anyhow::bail!("status_interval_ms must be greater than 0");
    }

    match (control.rethrottle_after_ms, control.rethrottle_to) {
        (Some(_), None) => anyhow::bail!("rethrottle_after_ms requires rethrottle_to"),
        (None, Some(_)) => anyhow::bail!("rethrottle_to requires rethrottle_after_ms"),
        _ => {}
    }

    if control.cancel_after_ms.is_some() && control.cancel_reason.trim().is_empty() {
        anyhow::bail!("cancel_reason must not be empty");
    }

    Ok(())
}
