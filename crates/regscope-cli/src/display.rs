//! Vertical card display for compliance verdicts.
//!
//! Renders a verdict as grouped, human-readable sections. Empty sections
//! are skipped; long lists are cut at [`MAX_LIST_ITEMS`].

use std::fmt::Write;

use regscope_core::clarification::ClarificationRequest;
use regscope_core::finding::JurisdictionFinding;
use regscope_core::tool::ToolDescriptor;
use regscope_core::verdict::ComplianceVerdict;

const MAX_LIST_ITEMS: usize = 10;
const MAX_LINE_CHARS: usize = 100;

// ── Public API ──

/// Print a verdict as a vertical card.
pub fn print_verdict_card(verdict: &ComplianceVerdict) {
    print!("{}", render_verdict_card(verdict));
}

/// Print discovered tools, one block per tool.
pub fn print_tools(tools: &[ToolDescriptor]) {
    print!("{}", render_tools(tools));
}

/// Print a clarification prompt to stderr with numbered options.
pub fn print_prompt(request: &ClarificationRequest) {
    eprint!("{}", render_prompt(request));
}

// ── Rendering ──

pub fn render_verdict_card(v: &ComplianceVerdict) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", v.feature_name);
    let _ = writeln!(out, "{}", v.feature_id);
    let _ = writeln!(out);

    section(&mut out, "Verdict");
    field(&mut out, "compliance_required", yes_no(v.compliance_required));
    field(&mut out, "risk_level", &format!("{}/5 ({})", v.risk_level, risk_label(v.risk_level)));
    field(&mut out, "confidence", &format!("{:.2}", v.confidence_score));
    field(&mut out, "manual_review", yes_no(v.manual_review_recommended));
    field(&mut out, "session_status", v.session_status.as_str());
    field(&mut out, "analysis_time", &format!("{:.1}s", v.total_analysis_time_seconds));
    field(&mut out, "created_at", &v.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    let _ = writeln!(out);

    if !v.applicable_jurisdictions.is_empty() {
        section(&mut out, "Jurisdictions");
        field(&mut out, "applicable", &v.applicable_jurisdictions.join(", "));
        let _ = writeln!(out);
    }

    list_section(&mut out, "Requirements", &v.requirements);
    list_section(&mut out, "Implementation Steps", &v.implementation_steps);

    if !v.per_jurisdiction_details.is_empty() {
        section(&mut out, "Per-Jurisdiction Findings");
        for finding in v.per_jurisdiction_details.iter().take(MAX_LIST_ITEMS) {
            finding_line(&mut out, finding);
        }
        more(&mut out, v.per_jurisdiction_details.len());
        let _ = writeln!(out);
    }

    if !v.reasoning.is_empty() {
        section(&mut out, "Reasoning");
        for line in v.reasoning.lines().filter(|l| !l.trim().is_empty()) {
            let _ = writeln!(out, "  {}", truncate(line.trim(), MAX_LINE_CHARS));
        }
        let _ = writeln!(out);
    }

    if !v.reasoning_log.is_empty() {
        section(&mut out, "Reasoning Log");
        for entry in v.reasoning_log.iter().take(MAX_LIST_ITEMS) {
            let _ = writeln!(
                out,
                "    #{:<3} {:<24} {:>6.2}s  {:?}",
                entry.iteration, entry.action, entry.duration_seconds, entry.source
            );
            if !entry.reasoning.is_empty() {
                let _ = writeln!(out, "      {}", truncate(&entry.reasoning, MAX_LINE_CHARS - 6));
            }
        }
        more(&mut out, v.reasoning_log.len());
        let _ = writeln!(out);
    }

    if !v.clarification_audit.is_empty() {
        section(&mut out, "Clarifications");
        for audit in &v.clarification_audit {
            let _ = writeln!(out, "    [{}] {}", audit.kind, truncate(&audit.question, MAX_LINE_CHARS));
            let _ = writeln!(
                out,
                "      answer ({}): {}",
                audit.source.as_str(),
                truncate(&audit.raw_answer, MAX_LINE_CHARS)
            );
            let _ = writeln!(out, "      -> {}", truncate(&audit.resolution, MAX_LINE_CHARS));
        }
        let _ = writeln!(out);
    }

    out
}

pub fn render_tools(tools: &[ToolDescriptor]) -> String {
    let mut out = String::new();
    if tools.is_empty() {
        let _ = writeln!(out, "No jurisdiction tools discovered.");
        return out;
    }
    let _ = writeln!(out, "{} tool(s):", tools.len());
    let _ = writeln!(out);
    for tool in tools {
        let _ = writeln!(out, "{}", tool.name);
        field(&mut out, "jurisdiction", &tool.jurisdiction);
        if !tool.description.is_empty() {
            field(&mut out, "description", &truncate(&tool.description, MAX_LINE_CHARS));
        }
        if !tool.specialties.is_empty() {
            field(&mut out, "specialties", &tool.specialties.join(", "));
        }
        let _ = writeln!(out);
    }
    out
}

pub fn render_prompt(request: &ClarificationRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "── Clarification needed ({}) ──", request.kind);
    if !request.context.is_empty() {
        let _ = writeln!(out, "{}", truncate(&request.context, MAX_LINE_CHARS));
    }
    let _ = writeln!(out, "{}", request.question);
    for (i, option) in request.options.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, option);
    }
    let _ = write!(out, "Answer (number or free text): ");
    out
}

// ── Helpers ──

fn section(out: &mut String, header: &str) {
    let _ = writeln!(out, "{header}");
}

fn field(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "  {:<26} {}", label, value);
}

fn list_section(out: &mut String, header: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{} ({}):", header, items.len());
    for item in items.iter().take(MAX_LIST_ITEMS) {
        let _ = writeln!(out, "    - {}", truncate(item, MAX_LINE_CHARS));
    }
    more(out, items.len());
    let _ = writeln!(out);
}

fn finding_line(out: &mut String, f: &JurisdictionFinding) {
    let _ = writeln!(
        out,
        "    {:<24} required: {:<3}  risk: {}  confidence: {:.2}",
        f.jurisdiction,
        yes_no(f.compliance_required),
        f.risk_level,
        f.confidence
    );
    if !f.applicable_regulations.is_empty() {
        let regs = f.applicable_regulations.join(", ");
        let _ = writeln!(out, "      {}", truncate(&regs, MAX_LINE_CHARS - 6));
    }
}

fn more(out: &mut String, len: usize) {
    if len > MAX_LIST_ITEMS {
        let _ = writeln!(out, "    ... and {} more", len - MAX_LIST_ITEMS);
    }
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

fn risk_label(level: u8) -> &'static str {
    match level {
        0 | 1 => "minimal",
        2 => "low",
        3 => "moderate",
        4 => "high",
        _ => "critical",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
