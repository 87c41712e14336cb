//! Frame-name simplification for the query path only (spec 4.3) - never
//! applied to stored data, so a later change of boilerplate rules doesn't
//! require re-aggregating history.

/// Runtime-entry and HTTP-server scaffold frames treated as boilerplate
/// and trimmed from displayed stacks.
const BOILERPLATE_FRAMES: &[&str] = &[
    "runtime.goexit",
    "runtime.main",
    "tokio::runtime::task::harness",
    "hyper::server::conn",
    "axum::routing::Router::call",
];

/// Frames that indicate the profiler measuring itself; any stack
/// containing one of these is dropped entirely from hotspot output.
const SELF_MEASUREMENT_FRAMES: &[&str] = &["colony::poller", "colony::frame_dict", "pprof::profiler"];

/// Collapses any `/internal/X/` path segment to `/` and strips boilerplate
/// frames, for display purposes only.
pub fn simplify_frame_name(name: &str) -> String {
    let collapsed = collapse_internal_segment(name);
    if BOILERPLATE_FRAMES.iter().any(|f| collapsed == *f) {
        return String::new();
    }
    collapsed
}

fn collapse_internal_segment(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(start) = rest.find("/internal/") {
        result.push_str(&rest[..start]);
        result.push('/');
        let after = &rest[start + "/internal/".len()..];
        match after.find('/') {
            Some(end) => rest = &after[end + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    result.push_str(rest);
    result
}

/// Returns `true` when a stack should be excluded from hotspot output
/// because it measures the profiler's own infrastructure rather than the
/// target workload.
pub fn is_self_measurement(stack: &[String]) -> bool {
    stack.iter().any(|frame| SELF_MEASUREMENT_FRAMES.iter().any(|s| frame.contains(s)))
}

/// Simplifies every displayable frame in a stack, dropping boilerplate
/// frames entirely.
pub fn simplify_stack(stack: &[String]) -> Vec<String> {
    stack
        .iter()
        .map(|f| simplify_frame_name(f))
        .filter(|f| !f.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_internal_segment() {
        assert_eq!(
            collapse_internal_segment("pkg/internal/util/helper.go:foo"),
            "pkg/helper.go:foo"
        );
    }

    #[test]
    fn leaves_names_without_internal_segment_untouched() {
        assert_eq!(collapse_internal_segment("pkg/util/helper.go:foo"), "pkg/util/helper.go:foo");
    }

    #[test]
    fn boilerplate_frame_simplifies_to_empty() {
        assert_eq!(simplify_frame_name("runtime.goexit"), "");
    }

    #[test]
    fn self_measurement_stack_is_flagged() {
        let stack = vec!["colony::poller::poll_once".to_string(), "main".to_string()];
        assert!(is_self_measurement(&stack));
    }

    #[test]
    fn ordinary_stack_is_not_flagged() {
        let stack = vec!["app::handler::process".to_string()];
        assert!(!is_self_measurement(&stack));
    }
}
