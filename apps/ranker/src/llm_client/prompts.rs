// Shared prompt constants.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction that keeps analysis anchored to the supplied signals.
pub const EVIDENCE_INSTRUCTION: &str = "\
    CRITICAL: Base every judgement only on the signals provided. \
    Do NOT invent technologies, patterns or results that the signals do not support. \
    If something is not evident, leave it out.";
