use log::trace;

/// Logs summary statistics of a field about to be sent.
pub(crate) fn field(name: &str, values: &[f32]) {
    if values.is_empty() {
        trace!("field {name}: empty");
        return;
    }

    let (min, max, sum) = values.iter().fold(
        (f32::INFINITY, f32::NEG_INFINITY, 0.),
        |(min, max, sum), &x| (min.min(x), max.max(x), sum + x),
    );
    let mean = sum / values.len() as f32;

    trace!(
        "field {name}: len={} min={min} max={max} mean={mean}",
        values.len()
    );
}
