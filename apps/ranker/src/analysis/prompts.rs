use crate::llm_client::prompts::{EVIDENCE_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::models::analysis::{AnalysisDepth, AnalysisRequest, Complexity};

pub const ANALYSIS_SYSTEM: &str = JSON_ONLY_SYSTEM;

pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"
Analyze the technical depth of a personal software project from the signals below.

{evidence_instruction}

Signal sub-scores (0.0 – 1.0): {categories_json}
Detected skills, in detection order: {skills_json}
Supporting counts: {counts_json}
Heuristic complexity estimate: {baseline_complexity}

{depth_focus}

Return a JSON object with exactly these fields:
{
  "design_patterns": ["<pattern names evidenced by the signals, e.g. MVC, Observer, Repository>"],
  "complexity": "basic" | "intermediate" | "advanced",
  "depth_score": <number between 0.0 and 1.0>,
  "summary": "<one professional sentence suitable for a resume, or null>"
}
"#;

fn depth_focus(depth: AnalysisDepth) -> &'static str {
    match depth {
        AnalysisDepth::Overview => {
            "Focus on scope: what the project does and how large and complete it is."
        }
        AnalysisDepth::Technical => {
            "Focus on engineering depth: design patterns, data structure and algorithm \
             choices, code organization and testing practice."
        }
        AnalysisDepth::Full => {
            "Cover both scope and engineering depth: design patterns, data structure and \
             algorithm choices, architecture, testing practice and the concrete skills \
             the project demonstrates."
        }
    }
}

/// Builds the analysis prompt. Uses only the fields that also feed the
/// request fingerprint, so equal fingerprints always mean equal prompts.
pub fn build_analysis_prompt(request: &AnalysisRequest) -> String {
    let bundle = &request.bundle;
    let categories_json = serde_json::to_string(&bundle.categories).unwrap_or_default();
    let skills_json = serde_json::to_string(&bundle.skills).unwrap_or_default();
    let counts_json = serde_json::to_string(&bundle.counts).unwrap_or_default();

    ANALYSIS_PROMPT_TEMPLATE
        .replace("{evidence_instruction}", EVIDENCE_INSTRUCTION)
        .replace("{categories_json}", &categories_json)
        .replace("{skills_json}", &skills_json)
        .replace("{counts_json}", &counts_json)
        .replace(
            "{baseline_complexity}",
            Complexity::from_bundle(bundle).as_str(),
        )
        .replace("{depth_focus}", depth_focus(request.depth))
}
