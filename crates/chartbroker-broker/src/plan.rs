//! Mapping between catalog plan ids and chart versions
//!
//! The catalog advertises one plan per chart application version, with the
//! version sanitized into an id (`mariadb` + `10.3.22` -> `mariadb-10-3-22`).
//! Sanitizing is lossy, so the reverse mapping only recovers versions whose
//! components were already plain alphanumerics separated by dots. The exact
//! version that was resolved is recorded in the ledger at provision time.

/// Plan id the catalog advertises for a chart application version
///
/// The catalog lives outside this crate; [`chart_reference`] is the inverse
/// the broker applies to the plan ids it receives.
pub fn plan_id(chart: &str, app_version: &str) -> String {
    format!("{}-{}", chart, app_version)
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Chart name and version requested by a provision of `service_id`/`plan_id`
pub fn chart_reference(service_id: &str, plan_id: &str) -> (String, String) {
    let version = plan_id
        .replacen(&format!("{}-", service_id), "", 1)
        .replace('-', ".");
    (service_id.to_string(), version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_ids_are_sanitized() {
        assert_eq!(plan_id("mariadb", "10.3.22"), "mariadb-10-3-22");
        assert_eq!(plan_id("postgresql", "11.7.0"), "postgresql-11-7-0");
        assert_eq!(plan_id("Redis", "5.0.7+build_1"), "redis-5-0-7-build-1");
    }

    #[test]
    fn plan_ids_reverse_to_dotted_versions() {
        assert_eq!(
            chart_reference("mariadb", "mariadb-10-3-0"),
            ("mariadb".to_string(), "10.3.0".to_string())
        );
        assert_eq!(
            chart_reference("mysql", &plan_id("mysql", "8.0.19")),
            ("mysql".to_string(), "8.0.19".to_string())
        );
    }

    #[test]
    fn only_the_first_service_prefix_is_stripped() {
        assert_eq!(chart_reference("a", "a-a-1").1, "a.1");
    }

    #[test]
    fn lossy_versions_do_not_round_trip() {
        let id = plan_id("redis", "5.0.7-r1");
        assert_eq!(chart_reference("redis", &id).1, "5.0.7.r1");
    }
}
