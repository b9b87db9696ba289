use std::env;

use once_cell::sync::Lazy;

static GRAPHRT_DUMP_IR: Lazy<bool> = Lazy::new(|| match env::var("GRAPHRT_DUMP_IR") {
    Ok(value) if !value.trim().is_empty() => parse_bool(&value),
    _ => false,
});

static GRAPHRT_TRANSFORM_SWEEPS: Lazy<Option<usize>> = Lazy::new(|| {
    env::var("GRAPHRT_TRANSFORM_SWEEPS")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
});

static GRAPHRT_OPT_LEVEL: Lazy<Option<String>> = Lazy::new(|| {
    env::var("GRAPHRT_OPT_LEVEL")
        .ok()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
});

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

pub(crate) fn dump_ir_enabled() -> bool {
    *GRAPHRT_DUMP_IR
}

pub(crate) fn transform_sweeps() -> Option<usize> {
    *GRAPHRT_TRANSFORM_SWEEPS
}

pub(crate) fn optimization_level() -> Option<&'static str> {
    GRAPHRT_OPT_LEVEL.as_deref()
}
