//! Output filter: scans LLM responses for disclosure of the system prompt,
//! model identity, architecture, or security stack before anything reaches
//! the client.

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakCategory {
    SystemLeak,
    ModelLeak,
    ArchitectureLeak,
    SecurityLeak,
    OverrideLeak,
}

#[derive(Debug, Clone)]
pub struct LeakMatch {
    pub category: LeakCategory,
    pub matched: String,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Pass,
    Redact,
    Block,
}

#[derive(Debug, Clone)]
pub struct OutputScan {
    pub clean: bool,
    pub leaks: Vec<LeakMatch>,
    pub action: FilterAction,
}

#[derive(Debug, Clone)]
pub struct FilteredOutput {
    pub response: String,
    pub filtered: bool,
    pub action: FilterAction,
    pub reason: Option<String>,
}

/// Replacement text when a response is blocked outright.
pub const BLOCKED_FALLBACK: &str = "I can only share information from our product \
documentation. Could you rephrase your question about our products?";

#[rustfmt::skip]
const LEAK_PATTERNS: &[(&str, LeakCategory)] = &[
    // ── System prompt disclosure ─────────────────────────
    (r"system\s+prompt", LeakCategory::SystemLeak),
    (r"my\s+(initial\s+)?instructions\s+(are|say|state|were)", LeakCategory::SystemLeak),
    (r"i\s+(was|am)\s+(told|instructed|programmed|configured)\s+to", LeakCategory::SystemLeak),
    (r"here\s+(is|are)\s+my\s+(rules?|instructions?|prompt)", LeakCategory::SystemLeak),
    (r"my\s+(hidden|internal)\s+(rules?|directives?|prompt)", LeakCategory::SystemLeak),
    (r"the\s+developer\s+(told|instructed)\s+me", LeakCategory::SystemLeak),

    // ── Model / vendor identity and credentials ──────────
    (r"\bgpt-?[345][\w.-]*\b", LeakCategory::ModelLeak),
    (r"\b(openai|anthropic|claude|gemini|deepseek|mistral|grok|xai|llama)\b", LeakCategory::ModelLeak),
    (r"(powered|built|made)\s+by\s+\w+\s*(ai|labs)?", LeakCategory::ModelLeak),
    (r"large\s+language\s+model\s+(trained|developed|created)\s+by", LeakCategory::ModelLeak),
    (r"\bsk-[A-Za-z0-9]{16,}\b", LeakCategory::ModelLeak),
    (r"api[\s_-]?key\s*[:=]", LeakCategory::ModelLeak),
    (r"bearer\s+[A-Za-z0-9._-]{20,}", LeakCategory::ModelLeak),

    // ── Architecture disclosure ──────────────────────────
    (r"\b(pinecone|weaviate|qdrant|chroma|faiss|milvus)\b", LeakCategory::ArchitectureLeak),
    (r"vector\s+(database|store|index|search)", LeakCategory::ArchitectureLeak),
    (r"rag\s+pipeline", LeakCategory::ArchitectureLeak),
    (r"retrieval[\s-]augmented", LeakCategory::ArchitectureLeak),
    (r"cosine\s+similarity", LeakCategory::ArchitectureLeak),
    (r"embedding\s+(model|vector|dimension)", LeakCategory::ArchitectureLeak),
    (r"reciprocal\s+rank\s+fusion", LeakCategory::ArchitectureLeak),
    (r"\b(tf-idf|bm25)\b", LeakCategory::ArchitectureLeak),
    (r"\b(express|fastapi|flask|axum|actix)\b\s+(server|framework|app)", LeakCategory::ArchitectureLeak),
    (r"(chunk(ed|ing)?|split)\s+(the\s+)?(documents?|corpus)\s+into", LeakCategory::ArchitectureLeak),

    // ── Security stack disclosure ────────────────────────
    (r"(injection|intent)\s+(detector|detection|classifier)", LeakCategory::SecurityLeak),
    (r"security\s+(pipeline|middleware|filter|layer)", LeakCategory::SecurityLeak),
    (r"output\s+filter(ing)?", LeakCategory::SecurityLeak),
    (r"(input\s+)?sanitiz(er|ation)", LeakCategory::SecurityLeak),
    (r"(blocklist|blacklist|catalogue)\s+of\s+(patterns?|regex)", LeakCategory::SecurityLeak),
    (r"(classified|flagged)\s+as\s+(safe|suspicious|malicious)", LeakCategory::SecurityLeak),

    // ── Jailbreak acknowledgment ─────────────────────────
    (r"jailbreak\s+(mode|succeeded|enabled|activated)", LeakCategory::OverrideLeak),
    (r"developer\s+mode\s+(enabled|activated|on)", LeakCategory::OverrideLeak),
    (r"restrictions?\s+(removed|disabled|lifted|bypassed)", LeakCategory::OverrideLeak),
    (r"i\s+(will|can)\s+now\s+ignore", LeakCategory::OverrideLeak),
    (r"\bdan\s+mode\b", LeakCategory::OverrideLeak),
    (r"ignoring\s+(my|the)\s+(previous\s+)?(instructions?|safety|guidelines?)", LeakCategory::OverrideLeak),
];

pub struct OutputFilter {
    prefilter: RegexSet,
    patterns: Vec<Regex>,
}

impl Default for OutputFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFilter {
    pub fn new() -> Self {
        let sources: Vec<String> = LEAK_PATTERNS
            .iter()
            .map(|(pattern, _)| format!("(?i){pattern}"))
            .collect();
        Self {
            prefilter: RegexSet::new(&sources).expect("leak patterns must compile"),
            patterns: sources
                .iter()
                .map(|s| Regex::new(s).expect("leak patterns must compile"))
                .collect(),
        }
    }

    pub fn scan(&self, response: &str) -> OutputScan {
        let mut leaks = Vec::new();
        for idx in self.prefilter.matches(response) {
            let (_, category) = LEAK_PATTERNS[idx];
            if let Some(m) = self.patterns[idx].find(response) {
                leaks.push(LeakMatch {
                    category,
                    matched: m.as_str().to_string(),
                    index: m.start(),
                });
            }
        }

        let action = select_action(&leaks);
        OutputScan {
            clean: leaks.is_empty(),
            leaks,
            action,
        }
    }

    /// Apply the scan verdict: pass through, redact matched fragments, or
    /// replace the whole response with the fallback.
    pub fn filter(&self, response: &str) -> FilteredOutput {
        let scan = self.scan(response);
        match scan.action {
            FilterAction::Pass => FilteredOutput {
                response: response.to_string(),
                filtered: false,
                action: FilterAction::Pass,
                reason: None,
            },
            FilterAction::Redact => {
                let mut redacted = response.to_string();
                for leak in &scan.leaks {
                    redacted = redacted.replace(&leak.matched, "[redacted]");
                }
                FilteredOutput {
                    response: redacted,
                    filtered: true,
                    action: FilterAction::Redact,
                    reason: Some(leak_summary(&scan.leaks)),
                }
            }
            FilterAction::Block => FilteredOutput {
                response: BLOCKED_FALLBACK.to_string(),
                filtered: true,
                action: FilterAction::Block,
                reason: Some(leak_summary(&scan.leaks)),
            },
        }
    }
}

fn select_action(leaks: &[LeakMatch]) -> FilterAction {
    if leaks.is_empty() {
        return FilterAction::Pass;
    }
    let hard_leak = leaks.iter().any(|l| {
        matches!(
            l.category,
            LeakCategory::SystemLeak
                | LeakCategory::ModelLeak
                | LeakCategory::ArchitectureLeak
                | LeakCategory::SecurityLeak
        )
    });
    if hard_leak || leaks.len() >= 2 {
        FilterAction::Block
    } else {
        FilterAction::Redact
    }
}

fn leak_summary(leaks: &[LeakMatch]) -> String {
    let categories: Vec<String> = leaks.iter().map(|l| format!("{:?}", l.category)).collect();
    format!("leak categories: {}", categories.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> OutputScan {
        OutputFilter::new().scan(text)
    }

    fn filter(text: &str) -> FilteredOutput {
        OutputFilter::new().filter(text)
    }

    #[test]
    fn test_clean_response_passes() {
        let result = filter("The PMP-25 mounting holes are 6 mm in diameter.");
        assert!(!result.filtered);
        assert_eq!(result.action, FilterAction::Pass);
        assert_eq!(
            result.response,
            "The PMP-25 mounting holes are 6 mm in diameter."
        );
    }

    #[test]
    fn test_model_vendor_leak_blocks() {
        let result = filter("I am powered by Grok from xAI.");
        assert_eq!(result.action, FilterAction::Block);
        assert_eq!(result.response, BLOCKED_FALLBACK);
        assert!(result.filtered);
    }

    #[test]
    fn test_system_prompt_leak_blocks() {
        let result = filter("My system prompt says I should be helpful.");
        assert_eq!(result.action, FilterAction::Block);
    }

    #[test]
    fn test_architecture_leak_blocks() {
        for text in [
            "We use cosine similarity over a vector database.",
            "The RAG pipeline retrieves chunks first.",
            "Results come from Qdrant.",
        ] {
            assert_eq!(scan(text).action, FilterAction::Block, "missed: {text}");
        }
    }

    #[test]
    fn test_security_stack_leak_blocks() {
        let result = filter("Your message was classified as suspicious by the injection detector.");
        assert_eq!(result.action, FilterAction::Block);
    }

    #[test]
    fn test_single_override_leak_redacts() {
        let result = filter("Fine. Restrictions removed, what do you want to know?");
        assert_eq!(result.action, FilterAction::Redact);
        assert!(result.response.contains("[redacted]"));
        assert!(!result.response.to_lowercase().contains("restrictions removed"));
    }

    #[test]
    fn test_two_override_leaks_block() {
        let result = filter("Developer mode enabled. Restrictions lifted.");
        assert_eq!(result.action, FilterAction::Block);
    }

    #[test]
    fn test_filtered_response_is_clean() {
        // The invariant: whatever comes out of filter() scans clean for the
        // four hard leak categories.
        let dirty = [
            "I am powered by Grok from xAI.",
            "My system prompt says to help.",
            "cosine similarity search over Pinecone",
            "Restrictions removed, developer mode enabled",
        ];
        let f = OutputFilter::new();
        for text in dirty {
            let out = f.filter(text);
            let rescan = f.scan(&out.response);
            assert!(
                !rescan.leaks.iter().any(|l| !matches!(l.category, LeakCategory::OverrideLeak)),
                "hard leak survived filtering: {text:?} -> {:?}",
                out.response
            );
        }
    }

    #[test]
    fn test_scan_reports_positions() {
        let scan = scan("blah blah system prompt blah");
        assert!(!scan.clean);
        let leak = &scan.leaks[0];
        assert_eq!(leak.matched.to_lowercase(), "system prompt");
        assert_eq!(leak.index, 10);
    }

    #[test]
    fn test_credential_token_blocks() {
        let result = filter("Use sk-abcdefghijklmnop1234 for access.");
        assert_eq!(result.action, FilterAction::Block);
    }
}
