//! Live evaluation of the agent: does it accept the right requests, and does
//! it carry the user's numbers into the chart unchanged?

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use log::info;
use serde::Serialize;

use crate::agent::{AgentResponse, ChartAgent};
use crate::concurrency::run_parallel;
use crate::config::EvalConfig;
use crate::conversation::Conversation;

const VALUE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    Accept,
    Refuse,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringCase {
    pub input: &'static str,
    pub expected: Behavior,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyCase {
    pub input: &'static str,
    pub expected_labels: &'static [&'static str],
    pub expected_values: &'static [f64],
    pub description: &'static str,
}

pub fn filtering_cases() -> Vec<FilteringCase> {
    use Behavior::*;
    vec![
        FilteringCase {
            input: "Maak een staafgrafiek met verkoopcijfers: Jan=100, Feb=150, Mrt=120",
            expected: Accept,
            description: "Valid bar chart request in Dutch",
        },
        FilteringCase {
            input: "Create a bar chart with data X",
            expected: Accept,
            description: "Valid bar chart request in English",
        },
        FilteringCase {
            input: "Wat is het weer vandaag?",
            expected: Refuse,
            description: "Weather question (non-chart request)",
        },
        FilteringCase {
            input: "Maak een taartdiagram van de verkoop",
            expected: Refuse,
            description: "Pie chart request (unsupported chart type)",
        },
        FilteringCase {
            input: "Laat me een lijngrafiek zien van de groei over tijd",
            expected: Accept,
            description: "Valid line chart request",
        },
        FilteringCase {
            input: "Schrijf een gedicht over data",
            expected: Refuse,
            description: "Poem request (completely unrelated)",
        },
        FilteringCase {
            input: "Kun je een scatter plot maken?",
            expected: Refuse,
            description: "Scatter plot request (unsupported chart type)",
        },
        FilteringCase {
            input: "Geef me een grafiek met OV check-ins per dag",
            expected: Accept,
            description: "Valid chart request without specifying type",
        },
        FilteringCase {
            input: "Wat zijn de beste restaurants in Amsterdam?",
            expected: Refuse,
            description: "Restaurant question (non-chart request)",
        },
        FilteringCase {
            input: "Maak een lijn grafiek met studieschuld data",
            expected: Accept,
            description: "Valid line chart request",
        },
    ]
}

pub fn accuracy_cases() -> Vec<AccuracyCase> {
    vec![
        AccuracyCase {
            input: "Maak een grafiek met Mon=10, Tue=20, Wed=15",
            expected_labels: &["Mon", "Tue", "Wed"],
            expected_values: &[10.0, 20.0, 15.0],
            description: "Simple inline data with English labels",
        },
        AccuracyCase {
            input: "Geef me een grafiek met het aantal checkins per dag bij het OV: Maandag = 4.1, Dinsdag = 4.2, Woensdag = 4.4, Donderdag = 4.7, Vrijdag = 4.2, Zaterdag = 2.3, Zondag = 1.7. De getallen zijn in miljoenen check-ins.",
            expected_labels: &["Maandag", "Dinsdag", "Woensdag", "Donderdag", "Vrijdag", "Zaterdag", "Zondag"],
            expected_values: &[4.1, 4.2, 4.4, 4.7, 4.2, 2.3, 1.7],
            description: "OV checkins (decimal values)",
        },
        AccuracyCase {
            input: "Ik wil een grafiek die aangeeft hoeveel miljard studieschuld studenten hebben in de laatste jaren. De waarden zijn: 2020 = 25, 2021 = 26, 2022 = 26.5, 2023 = 27.3, 2024 = 27.9, en 2025 = 29.",
            expected_labels: &["2020", "2021", "2022", "2023", "2024", "2025"],
            expected_values: &[25.0, 26.0, 26.5, 27.3, 27.9, 29.0],
            description: "Studieschuld (year labels)",
        },
        AccuracyCase {
            input: "Maak een staafgrafiek: Q1=100, Q2=150, Q3=175, Q4=200",
            expected_labels: &["Q1", "Q2", "Q3", "Q4"],
            expected_values: &[100.0, 150.0, 175.0, 200.0],
            description: "Quarterly data",
        },
        AccuracyCase {
            input: "Lijn grafiek met temperatuur: Jan=5, Feb=7, Mrt=12, Apr=15",
            expected_labels: &["Jan", "Feb", "Mrt", "Apr"],
            expected_values: &[5.0, 7.0, 12.0, 15.0],
            description: "Temperature data with Dutch month abbreviations",
        },
    ]
}

/// A request counts as accepted only when it succeeded and produced a chart.
pub fn classify(response: &AgentResponse) -> Behavior {
    if !response.success {
        Behavior::Error
    } else if response.chart_data.is_some() {
        Behavior::Accept
    } else {
        Behavior::Refuse
    }
}

pub fn labels_match(actual: &[String], expected: &[&str]) -> bool {
    actual.len() == expected.len() && actual.iter().zip(expected).all(|(a, e)| a == e)
}

pub fn values_match(actual: &[f64], expected: &[f64]) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, e)| (a - e).abs() < VALUE_TOLERANCE)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringResult {
    pub test_case: FilteringCase,
    pub passed: bool,
    pub actual_behavior: Behavior,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_values: Option<Vec<f64>>,
    pub reason: String,
}

pub fn score_run(case: &AccuracyCase, response: &AgentResponse) -> RunResult {
    let chart = match (&response.chart_data, response.success) {
        (Some(chart), true) => chart,
        (_, false) => {
            return RunResult {
                passed: false,
                actual_labels: None,
                actual_values: None,
                reason: response
                    .error
                    .clone()
                    .unwrap_or_else(|| response.message.clone()),
            };
        }
        (None, true) => {
            return RunResult {
                passed: false,
                actual_labels: None,
                actual_values: None,
                reason: "No chart created".to_string(),
            };
        }
    };

    let labels_ok = labels_match(chart.labels(), case.expected_labels);
    let values_ok = values_match(chart.values(), case.expected_values);
    let reason = match (labels_ok, values_ok) {
        (true, true) => "Data matches",
        (false, true) => "Labels mismatch",
        (true, false) => "Values mismatch",
        (false, false) => "Labels mismatch, Values mismatch",
    };

    RunResult {
        passed: labels_ok && values_ok,
        actual_labels: Some(chart.labels().to_vec()),
        actual_values: Some(chart.values().to_vec()),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyResult {
    pub test_case: AccuracyCase,
    pub pass_rate: f32,
    pub passed_runs: usize,
    pub total_runs: usize,
    pub runs: Vec<RunResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalSection<T> {
    pub test_name: String,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub details: Vec<T>,
}

impl<T> EvalSection<T> {
    fn pass_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f32 / self.total as f32 * 100.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluations {
    pub filtering: EvalSection<FilteringResult>,
    pub accuracy: EvalSection<AccuracyResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_tests: usize,
    pub total_passed: usize,
    pub total_failed: usize,
    pub pass_rate: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalReport {
    pub timestamp: String,
    pub evaluations: Evaluations,
    pub summary: Summary,
}

impl EvalReport {
    pub fn new(filtering: EvalSection<FilteringResult>, accuracy: EvalSection<AccuracyResult>) -> Self {
        let total_tests = filtering.total + accuracy.total;
        let total_passed = filtering.passed + accuracy.passed;
        let total_failed = filtering.failed + accuracy.failed;
        let rate = if total_tests == 0 {
            0.0
        } else {
            total_passed as f32 / total_tests as f32 * 100.0
        };
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            evaluations: Evaluations { filtering, accuracy },
            summary: Summary {
                total_tests,
                total_passed,
                total_failed,
                pass_rate: format!("{:.1}%", rate),
            },
        }
    }

    pub fn all_passed(&self) -> bool {
        self.summary.total_failed == 0
    }

    /// Write `eval-results-{epochMillis}.json` under `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create results directory: {}", dir.display()))?;
        let path = dir.join(format!(
            "eval-results-{}.json",
            chrono::Utc::now().timestamp_millis()
        ));
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize eval report")?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write eval report: {}", path.display()))?;
        Ok(path)
    }
}

/// Drives the evaluation suites against a live agent.
pub struct Evaluator {
    agent: Arc<ChartAgent>,
    config: EvalConfig,
}

impl Evaluator {
    pub fn new(agent: Arc<ChartAgent>, config: EvalConfig) -> Self {
        Self { agent, config }
    }

    pub async fn run_filtering(&self) -> EvalSection<FilteringResult> {
        println!("{}", "Running filtering evaluation...".bold());
        let mut details = Vec::new();

        for case in filtering_cases() {
            println!("Testing: {}", case.description);
            let response = self.agent.process(case.input, &Conversation::new(), None).await;
            let actual = classify(&response);
            let passed = actual == case.expected;

            if passed {
                println!("  {}", "PASSED".green());
            } else {
                println!(
                    "  {} expected {:?}, got {:?}",
                    "FAILED".red(),
                    case.expected,
                    actual
                );
            }

            let reason = match &response.error {
                Some(error) => error.clone(),
                None => response.message.chars().take(100).collect(),
            };
            details.push(FilteringResult {
                test_case: case,
                passed,
                actual_behavior: actual,
                reason,
            });
        }

        section("Request Filtering Evaluation", details, |d| d.passed)
    }

    pub async fn run_accuracy(&self) -> Result<EvalSection<AccuracyResult>> {
        let runs_per_test = self.config.runs_per_test.max(1);
        println!(
            "{}",
            format!("Running data accuracy evaluation ({} runs per test)...", runs_per_test).bold()
        );
        let mut details = Vec::new();

        for case in accuracy_cases() {
            println!("Testing: {}", case.description);

            let futs: Vec<_> = (0..runs_per_test)
                .map(|_| {
                    let agent = self.agent.clone();
                    let case = case.clone();
                    async move {
                        let response = agent.process(case.input, &Conversation::new(), None).await;
                        score_run(&case, &response)
                    }
                })
                .collect();
            let runs = run_parallel(futs).await?;

            for (i, run) in runs.iter().enumerate() {
                let mark = if run.passed { "✓".green() } else { "✗".red() };
                println!("  Run {}: {} {}", i + 1, mark, run.reason);
            }

            let passed_runs = runs.iter().filter(|r| r.passed).count();
            let pass_rate = passed_runs as f32 / runs_per_test as f32;
            info!("{}: {}/{} runs passed", case.description, passed_runs, runs_per_test);

            details.push(AccuracyResult {
                test_case: case,
                pass_rate,
                passed_runs,
                total_runs: runs_per_test,
                runs,
            });
        }

        let threshold = self.config.pass_threshold;
        Ok(section("Data Accuracy Evaluation", details, |d| d.pass_rate > threshold))
    }

    /// Run both suites, print a summary and persist the report.
    pub async fn run_all(&self) -> Result<(EvalReport, PathBuf)> {
        let filtering = self.run_filtering().await;
        print_section(&filtering);
        let accuracy = self.run_accuracy().await?;
        print_section(&accuracy);

        let report = EvalReport::new(filtering, accuracy);
        println!(
            "Overall: {}/{} passed ({})",
            report.summary.total_passed, report.summary.total_tests, report.summary.pass_rate
        );
        let path = report.save(Path::new(&self.config.results_dir))?;
        println!("Results saved to: {}", path.display());
        Ok((report, path))
    }
}

fn section<T>(name: &str, details: Vec<T>, passed: impl Fn(&T) -> bool) -> EvalSection<T> {
    let passed_count = details.iter().filter(|d| passed(d)).count();
    EvalSection {
        test_name: name.to_string(),
        passed: passed_count,
        failed: details.len() - passed_count,
        total: details.len(),
        details,
    }
}

fn print_section<T>(section: &EvalSection<T>) {
    println!(
        "{}: {} passed, {} failed of {} ({:.1}%)",
        section.test_name.bold(),
        section.passed.to_string().green(),
        section.failed.to_string().red(),
        section.total,
        section.pass_rate()
    );
}
