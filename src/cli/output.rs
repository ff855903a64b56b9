//! Output formatting helpers for CLI commands

use crate::orchestrator::{RunOutput, RunSummary, SiteReport};
use crate::rules::RuleOutcome;
use crate::site::{Action, DecisionSource};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

/// Format per-site decisions as a table, in processing order
pub fn format_decisions_table(reports: &[SiteReport]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Site",
        "Action",
        "Quantity",
        "Confidence",
        "Source",
        "Urgency",
        "Expiry (days)",
        "Allocated",
    ]);

    for r in reports {
        let d = &r.decision;
        table.add_row(vec![
            Cell::new(&r.site.id),
            Cell::new(action_label(d.action)),
            Cell::new(d.quantity),
            Cell::new(format!("{:.2}", d.confidence)),
            Cell::new(source_label(d.source, d.degraded)),
            Cell::new(format!("{:.2}", r.site.urgency_score)),
            Cell::new(r.site.days_to_expiry),
            Cell::new(r.allocated),
        ]);
    }

    table.to_string()
}

/// Format run statistics as a two-column table
pub fn format_summary(summary: &RunSummary) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value"]);

    let rows: Vec<(&str, String)> = vec![
        ("Mode", format!("{:?}", summary.mode)),
        ("Sites", summary.total_sites.to_string()),
        ("Needing resupply", summary.sites_needing_resupply.to_string()),
        ("Total quantity", summary.total_quantity.to_string()),
        ("Reasoning sites", summary.reasoning_sites.to_string()),
        ("Rule sites", summary.rule_sites.to_string()),
        ("Degraded sites", summary.degraded_sites.to_string()),
        ("Reasoning %", format!("{:.2}", summary.reasoning_percentage)),
        ("Avg latency (ms)", format!("{:.2}", summary.avg_latency_ms)),
        ("Allocated", summary.allocation.total_allocated.to_string()),
        (
            "Optimization score",
            format!("{:.2}", summary.allocation.optimization_score),
        ),
        ("Unmet sites", summary.allocation.unmet_demand_sites.to_string()),
    ];
    for (metric, value) in rows {
        table.add_row(vec![Cell::new(metric), Cell::new(value)]);
    }

    table.to_string()
}

/// Format a run as pretty JSON
pub fn format_run_json(run: &RunOutput) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(run)
}

/// Format a single rule evaluation
pub fn format_rule_outcome(outcome: &RuleOutcome) -> String {
    format!(
        "{} {} (safety stock {})\n{}",
        action_label(outcome.action),
        outcome.quantity,
        outcome.safety_stock,
        outcome.reason
    )
}

fn action_label(action: Action) -> String {
    match action {
        Action::Resupply => "resupply".yellow().bold().to_string(),
        Action::NoResupply => "no_resupply".green().to_string(),
    }
}

fn source_label(source: DecisionSource, degraded: bool) -> String {
    match (source, degraded) {
        (DecisionSource::Reasoning, _) => "reasoning".cyan().to_string(),
        (DecisionSource::Rule, true) => "rule (degraded)".red().to_string(),
        (DecisionSource::Rule, false) => "rule".to_string(),
    }
}
