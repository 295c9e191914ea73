use super::counters::Counters;

/// Content type of the Prometheus text exposition format.
pub(crate) const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Point-in-time values rendered next to the response counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunGauges {
    pub dropped: u64,
    pub in_flight: usize,
    pub concurrency_limit: usize,
}

/// Renders counters and gauges in the Prometheus text exposition format.
#[must_use]
pub fn render_exposition(counters: &Counters, gauges: RunGauges) -> String {
    let mut output = String::new();

    write_line(
        &mut output,
        "# HELP loadtest_responses_total Completed calls by response status; code -1 marks transport failures.",
    );
    write_line(&mut output, "# TYPE loadtest_responses_total counter");
    for (outcome, count) in counters.iter() {
        write_line(
            &mut output,
            &format!(
                "loadtest_responses_total{{code=\"{}\",status=\"{}\"}} {}",
                outcome.status_code,
                escape_label_value(&outcome.status_label),
                count
            ),
        );
    }

    write_line(
        &mut output,
        "# HELP loadtest_outcomes_dropped_total Outcomes discarded because the intake was full or closed.",
    );
    write_line(&mut output, "# TYPE loadtest_outcomes_dropped_total counter");
    write_line(
        &mut output,
        &format!("loadtest_outcomes_dropped_total {}", gauges.dropped),
    );

    write_line(
        &mut output,
        "# HELP loadtest_requests_in_flight Requests currently holding a concurrency permit.",
    );
    write_line(&mut output, "# TYPE loadtest_requests_in_flight gauge");
    write_line(
        &mut output,
        &format!("loadtest_requests_in_flight {}", gauges.in_flight),
    );

    write_line(
        &mut output,
        "# HELP loadtest_concurrency_limit Configured ceiling on in-flight requests.",
    );
    write_line(&mut output, "# TYPE loadtest_concurrency_limit gauge");
    write_line(
        &mut output,
        &format!("loadtest_concurrency_limit {}", gauges.concurrency_limit),
    );

    output
}

fn write_line(output: &mut String, line: &str) {
    output.push_str(line);
    output.push('\n');
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
