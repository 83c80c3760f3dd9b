//! Subcommand implementations.

pub mod config;
pub mod sync;

use daysync_engine::SyncResult;

/// Renders a summary line plus one line per failure.
pub fn render_result(label: &str, result: &SyncResult) -> String {
    let mut out = format!("{label}: {result}");
    for failure in &result.errors {
        out.push_str(&format!(
            "\n  {} [{}] {}",
            failure.key, failure.category, failure.message
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use daysync_engine::SyncFailure;

    #[test]
    fn renders_failures_under_summary() {
        let result = SyncResult {
            created: vec![],
            skipped: vec![],
            errors: vec![SyncFailure {
                key: "103".into(),
                category: "data",
                message: "bad date".into(),
            }],
            total: 1,
        };
        assert_eq!(
            render_result("workout", &result),
            "workout: 1 total, 0 created, 0 skipped, 1 failed\n  103 [data] bad date"
        );
    }
}
