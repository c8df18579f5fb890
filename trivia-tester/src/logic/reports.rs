use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::time::Duration;

use super::{ScenarioResult, StoreSummary};

#[allow(clippy::cast_precision_loss)]
fn success_rate(results: &[ScenarioResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let passed = results.iter().filter(|r| r.passed).count();
    (passed as f64 / results.len() as f64) * 100.0
}

pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    store: Option<&StoreSummary>,
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Episode Test Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "================================".cyan())?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    writeln!(out, "Total scenarios: {total_tests}")?;
    writeln!(out, "Passed: {}", passed_tests.to_string().green())?;
    writeln!(out, "Failed: {}", failed_tests.to_string().red())?;
    writeln!(out, "Success rate: {:.1}%", success_rate(results))?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(out, "{status} {}", result.scenario_name.bold())?;
        writeln!(
            out,
            "   Cases: {}/{} successful",
            result.successful_cases, result.cases_run
        )?;
        writeln!(out, "   Average time: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &result.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }

    if let Some(store) = store {
        writeln!(out, "{}", "💾 Episode Store".bright_yellow().bold())?;
        writeln!(out, "{}", "================".yellow())?;
        writeln!(out, "Stored: {}", store.stored)?;
        writeln!(out, "Reproduced: {}", store.reproduced)?;
        for failure in &store.failures {
            writeln!(out, "  • {}", failure.red())?;
        }
    }
    Ok(())
}

pub fn generate_json_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    store: Option<&StoreSummary>,
) -> Result<()> {
    let payload = serde_json::json!({
        "results": results,
        "store": store,
    });
    serde_json::to_writer_pretty(&mut *out, &payload)?;
    writeln!(out)?;
    Ok(())
}

pub fn generate_markdown_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    store: Option<&StoreSummary>,
) -> Result<()> {
    writeln!(out, "# Trivia Episode Test Results\n")?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();

    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total scenarios**: {total_tests}")?;
    writeln!(out, "- **Passed**: {passed_tests}")?;
    writeln!(out, "- **Failed**: {}", total_tests - passed_tests)?;
    writeln!(out, "- **Success rate**: {:.1}%\n", success_rate(results))?;

    writeln!(out, "## Detailed Results\n")?;
    for result in results {
        let status = if result.passed { "✅" } else { "❌" };
        writeln!(out, "### {status} {}\n", result.scenario_name)?;
        writeln!(
            out,
            "- **Cases**: {}/{} successful",
            result.successful_cases, result.cases_run
        )?;
        writeln!(out, "- **Average time**: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(out, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        writeln!(out)?;
    }

    if let Some(store) = store {
        writeln!(out, "## Episode Store\n")?;
        writeln!(out, "- **Stored**: {}", store.stored)?;
        writeln!(out, "- **Reproduced**: {}", store.reproduced)?;
        for failure in &store.failures {
            writeln!(out, "  - {failure}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: name.to_string(),
            passed,
            cases_run: 2,
            successful_cases: if passed { 2 } else { 1 },
            failures: if passed {
                Vec::new()
            } else {
                vec!["aave 2024-07-24: slot closer unfilled".to_string()]
            },
            average_duration: Duration::from_micros(250),
        }
    }

    #[test]
    fn markdown_lists_failures() {
        let mut buf = Vec::new();
        generate_markdown_report(&mut buf, &[result("smoke", true), result("difficulty", false)], None)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("- **Success rate**: 50.0%"));
        assert!(text.contains("### ❌ difficulty"));
        assert!(text.contains("slot closer unfilled"));
    }

    #[test]
    fn json_includes_store_summary() {
        let mut buf = Vec::new();
        let store = StoreSummary {
            stored: 2,
            reproduced: 2,
            failures: Vec::new(),
        };
        generate_json_report(&mut buf, &[result("smoke", true)], Some(&store)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["results"][0]["scenario_name"], "smoke");
        assert_eq!(value["store"]["stored"], 2);
    }

    #[test]
    fn console_report_handles_empty_results() {
        let mut buf = Vec::new();
        generate_console_report(&mut buf, &[], None, Duration::ZERO).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Total scenarios: 0"));
    }
}
