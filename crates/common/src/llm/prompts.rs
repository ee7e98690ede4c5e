//! Prompt templates for the analysis operations
//!
//! Every prompt instructs the model to answer with a single JSON object and
//! spells out the expected keys. The matching `*_fallback` builders produce
//! the payload used when the model ignores that instruction.

use crate::providers::PaperRecord;
use serde_json::{json, Value};

pub const ANALYSIS_SYSTEM: &str = "You are a research assistant specializing in plasma catalysis \
and related fields (nonthermal plasma, dielectric barrier discharge, plasma-assisted synthesis). \
You analyze academic papers and patents rigorously. Always respond with a single valid JSON \
object and nothing else - no markdown fences, no commentary.";

const ANALYSIS_TEMPLATE: &str = r#"Analyze the following papers and respond with a JSON object
containing exactly these keys:
- "summary": string, a synthesis of the batch in 3-5 sentences
- "key_findings": array of strings, the most important results across the papers
- "methods": array of strings, experimental and computational methods used
- "research_gaps": array of strings, open problems the papers leave unaddressed
- "suggested_directions": array of strings, concrete follow-up studies

Papers:
{papers}"#;

const RESEARCH_ANALYSIS_TEMPLATE: &str = r#"Critically assess the following research summary and
respond with a JSON object containing exactly these keys:
- "strengths": array of strings
- "weaknesses": array of strings
- "novelty_assessment": string, how novel this line of work is relative to the field
- "recommended_directions": array of strings, where the research should go next

Research summary:
{summary}"#;

const INTRODUCTION_TEMPLATE: &str = r#"Write the introduction section of a research paper on the
topic "{topic}", drawing on the reference papers below. Respond with a JSON object containing
exactly these keys:
- "introduction": string, the full introduction text (4-6 paragraphs, academic register)
- "cited_titles": array of strings, titles of the reference papers actually drawn on

Reference papers:
{papers}"#;

const PAPER_PLAN_TEMPLATE: &str = r#"Design a publication plan for a new research paper on the
topic "{topic}", informed by the reference papers below. Respond with a JSON object containing
exactly these keys:
- "title": string, a working title
- "sections": array of objects, each with "heading" (string) and "points" (array of strings)
- "target_journals": array of strings, journals this work would suit

Reference papers:
{papers}"#;

/// Render papers into the numbered list format the templates expect
pub fn format_papers(papers: &[PaperRecord]) -> String {
    papers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut entry = format!("{}. {}", i + 1, p.title);
            if !p.authors.is_empty() {
                entry.push_str(&format!("\n   Authors: {}", p.authors.join(", ")));
            }
            if let Some(ref journal) = p.journal {
                entry.push_str(&format!("\n   Journal: {}", journal));
            }
            if let Some(year) = p.year {
                entry.push_str(&format!("\n   Year: {}", year));
            }
            if let Some(ref abstract_text) = p.abstract_text {
                entry.push_str(&format!("\n   Abstract: {}", abstract_text));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Append an optional focus instruction to a rendered prompt
fn with_focus(prompt: String, focus: Option<&str>) -> String {
    match focus.map(str::trim).filter(|f| !f.is_empty()) {
        Some(focus) => format!("{}\n\nFocus the analysis on: {}", prompt, focus),
        None => prompt,
    }
}

pub fn build_analysis_prompt(papers: &[PaperRecord], focus: Option<&str>) -> String {
    with_focus(
        ANALYSIS_TEMPLATE.replace("{papers}", &format_papers(papers)),
        focus,
    )
}

pub fn build_research_analysis_prompt(summary: &str, focus: Option<&str>) -> String {
    with_focus(
        RESEARCH_ANALYSIS_TEMPLATE.replace("{summary}", summary),
        focus,
    )
}

pub fn build_introduction_prompt(topic: &str, papers: &[PaperRecord]) -> String {
    INTRODUCTION_TEMPLATE
        .replace("{topic}", topic)
        .replace("{papers}", &format_papers(papers))
}

pub fn build_paper_plan_prompt(topic: &str, papers: &[PaperRecord]) -> String {
    PAPER_PLAN_TEMPLATE
        .replace("{topic}", topic)
        .replace("{papers}", &format_papers(papers))
}

pub fn analysis_fallback(raw: &str) -> Value {
    json!({
        "summary": raw.trim(),
        "key_findings": [],
        "methods": [],
        "research_gaps": [],
        "suggested_directions": []
    })
}

pub fn research_analysis_fallback(raw: &str) -> Value {
    json!({
        "strengths": [],
        "weaknesses": [],
        "novelty_assessment": raw.trim(),
        "recommended_directions": []
    })
}

pub fn introduction_fallback(raw: &str) -> Value {
    json!({
        "introduction": raw.trim(),
        "cited_titles": []
    })
}

pub fn paper_plan_fallback(raw: &str) -> Value {
    json!({
        "title": "",
        "sections": [],
        "target_journals": [],
        "notes": raw.trim()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::PaperSource;

    fn sample_paper() -> PaperRecord {
        PaperRecord {
            title: "Plasma catalysis for CO2 conversion".into(),
            authors: vec!["X Tu".into(), "JC Whitehead".into()],
            abstract_text: Some("DBD reactor study...".into()),
            journal: Some("Applied Catalysis B".into()),
            year: Some(2019),
            source: PaperSource::GoogleScholar,
            url: None,
            citations: Some(412),
            doi: None,
            impact_factor: None,
            jcr_percentile: None,
        }
    }

    #[test]
    fn test_format_papers() {
        let formatted = format_papers(&[sample_paper()]);
        assert!(formatted.starts_with("1. Plasma catalysis"));
        assert!(formatted.contains("Authors: X Tu, JC Whitehead"));
        assert!(formatted.contains("Year: 2019"));
    }

    #[test]
    fn test_analysis_prompt_has_no_placeholder_left() {
        let prompt = build_analysis_prompt(&[sample_paper()], None);
        assert!(!prompt.contains("{papers}"));
        assert!(prompt.contains("\"key_findings\""));
        assert!(!prompt.contains("Focus the analysis on"));
    }

    #[test]
    fn test_focus_appended() {
        let prompt = build_analysis_prompt(&[sample_paper()], Some("energy efficiency"));
        assert!(prompt.ends_with("Focus the analysis on: energy efficiency"));

        let prompt = build_research_analysis_prompt("Our DBD reactor achieved 40% conversion.", None);
        assert!(prompt.contains("Our DBD reactor achieved 40% conversion."));
        assert!(!prompt.contains("{summary}"));
    }

    #[test]
    fn test_topic_prompts_substitute_topic() {
        let prompt = build_introduction_prompt("plasma ammonia synthesis", &[sample_paper()]);
        assert!(prompt.contains("\"plasma ammonia synthesis\""));
        assert!(!prompt.contains("{topic}"));

        let plan = build_paper_plan_prompt("plasma ammonia synthesis", &[]);
        assert!(plan.contains("plasma ammonia synthesis"));
    }

    #[test]
    fn test_fallbacks_preserve_raw_text() {
        let raw = "Free-form model answer.";
        assert_eq!(analysis_fallback(raw)["summary"], raw);
        assert_eq!(introduction_fallback(raw)["introduction"], raw);
        assert_eq!(research_analysis_fallback(raw)["novelty_assessment"], raw);
        assert_eq!(paper_plan_fallback(raw)["notes"], raw);
    }
}
