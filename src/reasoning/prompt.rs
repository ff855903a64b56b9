//! Prompt text for single-site and batch recommendations.

use crate::site::{NetworkContext, Site};
use std::fmt::Write;

const ROLE: &str = "You are a clinical trial supply analyst responsible for IRT resupply planning.";

const ANALYSIS: &str = "\
**Analysis:**
1. Inventory coverage in days: current inventory / weekly dispense rate * 7
2. Expiry risk: stock expiring within 30 days needs replacing first
3. Demand risk: projected 30-day demand against current inventory
4. Regional shipping times and regulatory lead times
5. Quantity: 30-day coverage plus a 20-30% buffer, weighed against overstock

Treat negative days to expiry as already expired stock. Sites with urgency above 2.0 are high priority.

";

const SINGLE_SHAPE: &str = r#"**Respond with JSON only:**
{
  "structured_result": {
    "action": "resupply" | "no_resupply",
    "quantity": <integer, 0 when no_resupply>,
    "confidence": <number between 0.0 and 1.0>,
    "reasons": ["...", "..."]
  },
  "draft_message": "<two paragraphs with the calculations and risks behind the recommendation>"
}"#;

const BATCH_SHAPE: &str = r#"**Respond with JSON only, one entry per site in the order given:**
{
  "sites": [
    {
      "site_id": "<site id exactly as given>",
      "structured_result": {
        "action": "resupply" | "no_resupply",
        "quantity": <integer, 0 when no_resupply>,
        "confidence": <number between 0.0 and 1.0>,
        "reasons": ["...", "..."]
      },
      "draft_message": "<two paragraphs with the calculations and risks behind the recommendation>"
    }
  ]
}"#;

fn write_metrics(out: &mut String, site: &Site) {
    let _ = writeln!(out, "- Site Name: {}", site.name);
    let _ = writeln!(out, "- Region: {}", site.region);
    let _ = writeln!(out, "- Projected 30-day Demand: {} kits", site.demand);
    let _ = writeln!(out, "- Current Inventory: {} kits", site.inventory);
    let _ = writeln!(
        out,
        "- Weekly Dispense Rate: {:.2} kits/week",
        site.weekly_dispense_kits
    );
    let _ = writeln!(
        out,
        "- Days to Expiry: {} days ({})",
        site.days_to_expiry,
        site.expiry_status()
    );
    let _ = writeln!(out, "- Urgency Score: {:.2}", site.urgency_score);
}

fn write_context(out: &mut String, context: &NetworkContext) {
    if context.total_sites == 0 {
        return;
    }
    let _ = writeln!(out, "**Network Context:**");
    let _ = writeln!(out, "- Total sites: {}", context.total_sites);
    let _ = writeln!(out, "- Average site inventory: {:.1} kits", context.avg_inventory);
    let _ = writeln!(out, "- Average projected demand: {:.1} kits", context.avg_demand);
    let _ = writeln!(out, "- Average urgency score: {:.2}", context.avg_urgency);
    out.push('\n');
}

/// Prompt for one site.
pub fn single_prompt(site: &Site, context: &NetworkContext) -> String {
    let mut out = String::with_capacity(2048);
    let _ = writeln!(out, "{} Recommend a resupply action for this site.\n", ROLE);
    let _ = writeln!(out, "**Site:** {}", site.id);
    write_metrics(&mut out, site);
    out.push('\n');
    write_context(&mut out, context);
    out.push_str(ANALYSIS);
    out.push_str(SINGLE_SHAPE);
    out
}

/// Prompt covering several sites in one call.
pub fn batch_prompt(sites: &[Site], context: &NetworkContext) -> String {
    let mut out = String::with_capacity(1024 + sites.len() * 512);
    let _ = writeln!(
        out,
        "{} Recommend a resupply action for each of the {} sites below.\n",
        ROLE,
        sites.len()
    );
    write_context(&mut out, context);
    for (n, site) in sites.iter().enumerate() {
        let _ = writeln!(out, "**Site {}:** {}", n + 1, site.id);
        write_metrics(&mut out, site);
        out.push('\n');
    }
    out.push_str(ANALYSIS);
    out.push_str(BATCH_SHAPE);
    out
}
