//! Markdown and plain-text report generation from a multi-period result.

use chrono_tz::Tz;
use reply_core::event::SourceKind;

use crate::aggregations::{format_duration, Window, WindowStats};
use crate::orchestrator::MultiPeriodResult;
use crate::periods::Period;

/// Report generator for creating response-time summaries.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Generate the daily markdown report: the daily period in detail, a
    /// per-source breakout, and the rolling 7/28 day figures.
    pub fn daily_report(result: &MultiPeriodResult) -> String {
        let tz = result.timezone;
        let daily = &result.combined.last_24h;
        let mut report = String::new();

        report.push_str(&format!(
            "# Daily Response Report\n\n**{}**\n\n",
            format_window(&daily.window(), tz)
        ));

        // Overview.
        report.push_str("## Overview\n\n");
        match daily {
            WindowStats::Empty { .. } => {
                report.push_str("No responses in this period.\n\n");
            }
            WindowStats::Populated(stats) => {
                report.push_str(&format!("- **Responses:** {}\n", stats.count()));
                report.push_str(&format!(
                    "- **Average Response Time:** {}\n",
                    format_duration(stats.mean())
                ));
                report.push_str(&format!(
                    "- **Median Response Time:** {}\n",
                    format_duration(stats.median())
                ));
                report.push_str(&format!(
                    "- **Fastest Response:** {}\n",
                    format_duration(stats.min())
                ));
                report.push_str(&format!(
                    "- **Slowest Response:** {}\n\n",
                    format_duration(stats.max())
                ));

                // Distribution table.
                let dist = stats.distribution();
                report.push_str("## Response Time Distribution\n\n");
                report.push_str("| Bucket | Responses | Share |\n");
                report.push_str("|--------|-----------|-------|\n");
                for (label, count) in dist.buckets() {
                    report.push_str(&format!(
                        "| {} | {} | {}% |\n",
                        label,
                        count,
                        dist.percent(count)
                    ));
                }
                report.push('\n');
            }
        }

        // Per-source breakout.
        if result.available().next().is_some() {
            report.push_str("## By Source\n\n");
            report.push_str("| Source | Kind | Responses | Average | Median |\n");
            report.push_str("|--------|------|-----------|---------|--------|\n");
            for (id, source) in result.available() {
                let stats = &source.stats.last_24h;
                let (avg, median) = averages(stats);
                report.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    id,
                    source.kind,
                    stats.count(),
                    avg,
                    median
                ));
            }
            report.push('\n');

            // Chat services (iMessage vs SMS and the like).
            for (id, source) in result.available() {
                if source.kind != SourceKind::Message {
                    continue;
                }
                if let Some(stats) = source.stats.last_24h.as_populated() {
                    let services: Vec<String> = stats
                        .breakdown("service")
                        .into_iter()
                        .map(|(service, count)| format!("{} {}", service, count))
                        .collect();
                    report.push_str(&format!("- **{} services:** {}\n", id, services.join(", ")));
                }
            }
        }

        // Rolling averages.
        let rolling: Vec<Period> = [Period::Last7d, Period::Last28d]
            .into_iter()
            .filter(|p| !result.combined.get(*p).is_empty())
            .collect();
        if !rolling.is_empty() {
            report.push_str("\n## Rolling Averages\n\n");
            report.push_str("| Period | Responses | Average | Median |\n");
            report.push_str("|--------|-----------|---------|--------|\n");
            for period in rolling {
                let stats = result.combined.get(period);
                let (avg, median) = averages(stats);
                report.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    period.label(),
                    stats.count(),
                    avg,
                    median
                ));
            }
            report.push('\n');
        }

        // Sources we could not read this run.
        let unavailable: Vec<_> = result.unavailable().collect();
        if !unavailable.is_empty() {
            report.push_str("## Unavailable Sources\n\n");
            for (id, reason) in unavailable {
                report.push_str(&format!("- {}: {}\n", id, reason));
            }
            report.push('\n');
        }

        report.push_str(&format!(
            "---\n_Generated on {}_\n",
            result.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        report
    }

    /// Generate a compact summary suitable for printing to a terminal.
    pub fn text_summary(result: &MultiPeriodResult) -> String {
        let mut output = String::new();

        for period in Period::ALL {
            let stats = result.combined.get(period);
            match stats.as_populated() {
                Some(s) => output.push_str(&format!(
                    "  {}: {} responses, avg {}, median {}\n",
                    period.label(),
                    s.count(),
                    format_duration(s.mean()),
                    format_duration(s.median())
                )),
                None => output.push_str(&format!("  {}: no responses\n", period.label())),
            }
        }

        for (id, source) in result.available() {
            output.push_str(&format!(
                "  {} ({}): {} / {} / {} responses",
                id,
                source.kind,
                source.stats.last_24h.count(),
                source.stats.last_7d.count(),
                source.stats.last_28d.count()
            ));
            if source.diagnostics.dropped > 0 {
                output.push_str(&format!(", {} records dropped", source.diagnostics.dropped));
            }
            output.push('\n');
        }

        for (id, reason) in result.unavailable() {
            output.push_str(&format!("  {}: unavailable ({})\n", id, reason));
        }

        output
    }
}

fn averages(stats: &WindowStats) -> (String, String) {
    match stats.as_populated() {
        Some(s) => (format_duration(s.mean()), format_duration(s.median())),
        None => ("-".to_string(), "-".to_string()),
    }
}

fn format_window(window: &Window, tz: Tz) -> String {
    format!(
        "{} - {} ({})",
        window.start.with_timezone(&tz).format("%b %d, %Y %I:%M %p"),
        window.end.with_timezone(&tz).format("%b %d, %Y %I:%M %p"),
        tz.name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{combine, SourceOutcome, SourceReport, SourcePolicy};
    use crate::periods::PeriodWindows;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use reply_core::config::DailyWindow;
    use reply_core::event::Event;
    use reply_core::source::{FetchedEvents, SourceId};
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn report_for(kind: SourceKind, latencies_mins: &[i64]) -> SourceReport {
        let mut events = Vec::new();
        for (i, &mins) in latencies_mins.iter().enumerate() {
            let key = format!("c{}", i);
            let responded = now() - Duration::hours(1);
            events.push(
                Event::received(key.clone(), responded - Duration::minutes(mins), kind)
                    .with_metadata("service", "iMessage"),
            );
            events.push(Event::sent(key, responded, kind));
        }
        let windows = PeriodWindows::compute(now(), DailyWindow::Trailing24h, chrono_tz::UTC);
        SourceReport::build(
            kind,
            &SourcePolicy::for_kind(kind),
            windows,
            FetchedEvents::new(events, 0),
        )
    }

    fn result(by_source: BTreeMap<SourceId, SourceOutcome>) -> MultiPeriodResult {
        let combined = combine(&by_source, now(), chrono_tz::UTC);
        MultiPeriodResult {
            generated_at: now(),
            timezone: chrono_tz::UTC,
            by_source,
            combined,
        }
    }

    fn sample() -> MultiPeriodResult {
        let mut by_source = BTreeMap::new();
        by_source.insert(
            SourceId::from("gmail"),
            SourceOutcome::Available(report_for(SourceKind::Email, &[5, 720])),
        );
        by_source.insert(
            SourceId::from("messages"),
            SourceOutcome::Available(report_for(SourceKind::Message, &[2])),
        );
        by_source.insert(
            SourceId::from("outlook"),
            SourceOutcome::Unavailable {
                kind: SourceKind::Email,
                reason: "token expired".into(),
            },
        );
        result(by_source)
    }

    #[test]
    fn test_daily_report_structure() {
        let report = ReportGenerator::daily_report(&sample());
        assert!(report.contains("# Daily Response Report"));
        assert!(report.contains("## Overview"));
        assert!(report.contains("- **Responses:** 3"));
        assert!(report.contains("## Response Time Distribution"));
        assert!(report.contains("| Under 1 hour | 2 | 66% |"));
        assert!(report.contains("| 1-24 hours | 1 | 33% |"));
        assert!(report.contains("## By Source"));
        assert!(report.contains("| gmail | email | 2 | 6 hours 2 min | 12 hours 0 min |"));
        assert!(report.contains("- **messages services:** iMessage 1"));
        assert!(report.contains("## Rolling Averages"));
        assert!(report.contains("## Unavailable Sources"));
        assert!(report.contains("- outlook: token expired"));
        assert!(report.contains("Generated on 2025-03-10 12:00:00 UTC"));
    }

    #[test]
    fn test_empty_daily_report() {
        let report = ReportGenerator::daily_report(&result(BTreeMap::new()));
        assert!(report.contains("# Daily Response Report"));
        assert!(report.contains("No responses in this period."));
        assert!(!report.contains("## By Source"));
        assert!(!report.contains("## Rolling Averages"));
    }

    #[test]
    fn test_text_summary() {
        let summary = ReportGenerator::text_summary(&sample());
        assert!(summary.contains("Daily: 3 responses"));
        assert!(summary.contains("Last 28 Days: 3 responses"));
        assert!(summary.contains("gmail (email): 2 / 2 / 2 responses"));
        assert!(summary.contains("outlook: unavailable (token expired)"));
    }

    #[test]
    fn test_empty_text_summary() {
        let summary = ReportGenerator::text_summary(&result(BTreeMap::new()));
        assert!(summary.contains("Daily: no responses"));
        assert!(summary.contains("Last 7 Days: no responses"));
    }
}
