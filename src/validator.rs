use crate::prelude::*;

/// Checks a reading against the registry and returns the unit it is stored under.
///
/// The wire format carries no unit, so the registry's own unit is used as the
/// declared one and the unit check always passes here.
pub fn validate(reading: &Reading, registry: &Registry) -> Result<Unit, Rejection> {
    let spec = registry
        .lookup(&reading.device_id)
        .ok_or_else(|| Rejection::UnknownDevice(reading.device_id.clone()))?;

    validate_declared(reading, spec.unit, registry)
}

/// Same checks as [`validate`] for a reading whose unit was stated by the sender.
/// Order: unknown device, unit mismatch, out of range.
pub fn validate_declared(
    reading: &Reading,
    declared: Unit,
    registry: &Registry,
) -> Result<Unit, Rejection> {
    let spec = registry
        .lookup(&reading.device_id)
        .ok_or_else(|| Rejection::UnknownDevice(reading.device_id.clone()))?;

    if !spec.is_unit(declared) {
        return Err(Rejection::UnitMismatch {
            device_id: reading.device_id.clone(),
            expected: spec.unit,
            actual: declared,
        });
    }

    if !spec.contains(reading.value) {
        return Err(Rejection::OutOfRange {
            device_id: reading.device_id.clone(),
            value: reading.value,
            range_start: spec.range_start,
            range_stop: spec.range_stop,
        });
    }

    Ok(spec.unit)
}
