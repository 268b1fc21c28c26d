//! Prometheus text exposition format.
//!
//! Renders a [`MetricsSnapshot`] for scraping by a Prometheus server or a
//! compatible agent.

use ondemand_state::ActivationState;

use crate::registry::MetricsSnapshot;

/// Content type of the rendered exposition.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Escape a label value: backslash, double quote and newline.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn header(out: &mut String, name: &str, kind: &str, help: &str) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} {kind}\n"));
}

/// Render a snapshot into Prometheus text format.
///
/// Services appear in snapshot order, which the registry sorts by name.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    header(
        &mut out,
        "service_status",
        "gauge",
        "Current activation status of the service (one-hot).",
    );
    for s in &snapshot.services {
        let Some(current) = s.status else { continue };
        let name = escape(&s.name);
        for state in ActivationState::ALL {
            let value = u8::from(state == current);
            out.push_str(&format!(
                "service_status{{service_name=\"{name}\",status=\"{state}\"}} {value}\n"
            ));
        }
    }

    header(
        &mut out,
        "service_last_started_time",
        "gauge",
        "Unix time of the last activation request for the service.",
    );
    for s in &snapshot.services {
        if let Some(secs) = s.last_started_secs {
            out.push_str(&format!(
                "service_last_started_time{{service_name=\"{}\"}} {secs}\n",
                escape(&s.name)
            ));
        }
    }

    header(
        &mut out,
        "service_timeout_seconds",
        "gauge",
        "Idle timeout last requested for the service.",
    );
    for s in &snapshot.services {
        if let Some(timeout) = s.timeout_secs {
            out.push_str(&format!(
                "service_timeout_seconds{{service_name=\"{}\"}} {timeout}\n",
                escape(&s.name)
            ));
        }
    }

    header(
        &mut out,
        "service_scale_down_error",
        "gauge",
        "1 if a scale down of the service has failed.",
    );
    for s in snapshot.services.iter().filter(|s| s.scale_down_error) {
        out.push_str(&format!(
            "service_scale_down_error{{service_name=\"{}\"}} 1\n",
            escape(&s.name)
        ));
    }

    header(
        &mut out,
        "scaler_scale_down_errors",
        "counter",
        "Total number of failed scale downs.",
    );
    out.push_str(&format!(
        "scaler_scale_down_errors {}\n",
        snapshot.scale_down_errors
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceSnapshot;

    fn service(name: &str, status: ActivationState) -> ServiceSnapshot {
        ServiceSnapshot {
            name: name.to_string(),
            status: Some(status),
            last_started_secs: Some(1_700_000_000),
            timeout_secs: Some(30.0),
            scale_down_error: false,
        }
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&MetricsSnapshot::default());
        assert!(output.contains("# TYPE service_status gauge"));
        assert!(output.contains("# TYPE scaler_scale_down_errors counter"));
        assert!(output.contains("scaler_scale_down_errors 0\n"));
        assert!(!output.contains("service_name"));
    }

    #[test]
    fn status_is_one_hot() {
        let snapshot = MetricsSnapshot {
            services: vec![service("whoami", ActivationState::Starting)],
            scale_down_errors: 0,
        };
        let output = render_prometheus(&snapshot);

        assert!(output.contains("service_status{service_name=\"whoami\",status=\"starting\"} 1\n"));
        assert!(output.contains("service_status{service_name=\"whoami\",status=\"started\"} 0\n"));
        assert!(output.contains("service_status{service_name=\"whoami\",status=\"unknown\"} 0\n"));
        assert!(output.contains("service_last_started_time{service_name=\"whoami\"} 1700000000\n"));
        assert!(output.contains("service_timeout_seconds{service_name=\"whoami\"} 30\n"));
    }

    #[test]
    fn scale_down_errors_are_rendered() {
        let mut failed = service("db", ActivationState::Started);
        failed.scale_down_error = true;
        let snapshot = MetricsSnapshot {
            services: vec![failed, service("web", ActivationState::Started)],
            scale_down_errors: 3,
        };
        let output = render_prometheus(&snapshot);

        assert!(output.contains("service_scale_down_error{service_name=\"db\"} 1\n"));
        assert!(!output.contains("service_scale_down_error{service_name=\"web\"}"));
        assert!(output.contains("scaler_scale_down_errors 3\n"));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape("a\nb"), "a\\nb");
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let snapshot = MetricsSnapshot {
            services: vec![service("test", ActivationState::Started)],
            scale_down_errors: 1,
        };
        let output = render_prometheus(&snapshot);

        for line in output.lines() {
            if line.starts_with('#') {
                continue;
            }
            let (series, value) = line.rsplit_once(' ').unwrap();
            assert!(!series.is_empty(), "line should name a series: {line}");
            assert!(value.parse::<f64>().is_ok(), "value should be numeric: {line}");
        }
    }
}
