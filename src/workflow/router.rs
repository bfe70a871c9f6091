//! Rule-based query router.
//!
//! Classifies a question before any LLM call: conversational turns (greetings,
//! meta-questions, bare acknowledgments) skip the database entirely; broad or
//! comparative questions go to the analytical workflow; everything else is a
//! standard single-query turn. Edit intent is detected separately so the
//! generator can choose the edit prompt when the session allows writes.

use regex::RegexSet;

/// Router classification for one question.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// No data-retrieval intent.
    pub is_conversational: bool,
    /// Broad/comparative/exploratory question.
    pub requires_analysis: bool,
    /// Question asks to modify data.
    pub is_edit: bool,
    /// Coarse intent label for logs and the envelope.
    pub intent: &'static str,
}

/// Stateless question classifier.
pub struct QueryRouter {
    conversational: RegexSet,
    analytical: RegexSet,
    edit: RegexSet,
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRouter {
    /// Build the router. Pattern compilation is infallible for the static
    /// sets below.
    #[must_use]
    pub fn new() -> Self {
        let conversational = RegexSet::new([
            r"^(hi|hello|hey|good morning|good afternoon|good evening|thanks|thank you|bye|goodbye)\b",
            r"^(how are you|how's it going|what's up|how do you do)\b",
            r"^(ok|okay|alright|got it|understood|sure|fine)\.?$",
            r"^(yes|yeah|yep|no|nope|maybe)\.?$",
            r"^(good|great|excellent|perfect|awesome|nice|cool)\.?$",
            r"^(what|how)\s+(can|do)\s+you\s+(do|help)",
            r"^(what|who)\s+are\s+you\b",
            r"^(how|what)\s+(does|is)\s+(this|the system|the app|the assistant)\b",
        ])
        .expect("static conversational patterns");

        let analytical = RegexSet::new([
            r"\banaly[sz]e\b|\banalysis\b",
            r"\bcomprehensive\b|\bdetailed\b|\bthorough\b|\bin[- ]depth\b",
            r"\bcompare\b|\bcontrast\b|\bversus\b|\bvs\.?\b",
            r"\btrend\b|\bover time\b|\bevolution\b|\bevolved\b",
            r"\bwhy\b|\bwhat\s+(causes|drives)\b",
            r"\bbreak\s*down\b|\bbreakdown\b",
            r"\bacross\b.+\band\b",
            r"\binsights?\b|\boverview\b|\blandscape\b",
        ])
        .expect("static analytical patterns");

        let edit = RegexSet::new([
            r"\badd\b|\binsert\b|\bregister\b|\benroll\b",
            r"\bupdate\b|\bmodify\b|\bchange\b|\bcorrect\b|\badjust\b|\bset\b",
            r"\bdelete\b|\bremove\b|\bdrop\b|\btruncate\b",
            r"\bcreate\s+(a\s+)?(new\s+)?(table|index|view|record|row|entry)\b",
        ])
        .expect("static edit patterns");

        Self {
            conversational,
            analytical,
            edit,
        }
    }

    /// Classify a question.
    #[must_use]
    pub fn route(&self, question: &str) -> RouteDecision {
        let q = question.trim().to_lowercase();

        if q.len() < 3 || self.conversational.is_match(&q) {
            return RouteDecision {
                is_conversational: true,
                requires_analysis: false,
                is_edit: false,
                intent: "conversational",
            };
        }

        let is_edit = self.edit.is_match(&q);
        let requires_analysis = !is_edit && self.analytical.is_match(&q);

        let intent = if is_edit {
            "edit"
        } else if requires_analysis {
            "analyze"
        } else if q.contains("how many") || q.contains("count") || q.contains("number of") {
            "count"
        } else if ["sum", "average", "mean", "max", "min", "total"]
            .iter()
            .any(|w| q.contains(w))
        {
            "calculate"
        } else {
            "retrieve"
        };

        RouteDecision {
            is_conversational: false,
            requires_analysis,
            is_edit,
            intent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greetings_are_conversational() {
        let router = QueryRouter::new();
        for q in ["hi", "Hello there", "what can you do?", "thanks", "ok"] {
            let decision = router.route(q);
            assert!(decision.is_conversational, "expected conversational: {q}");
        }
    }

    #[test]
    fn test_broad_questions_are_analytical() {
        let router = QueryRouter::new();
        for q in [
            "analyze SAP developer rates by supplier and region",
            "compare rates across suppliers and countries",
            "why is the average rate rising",
            "give me a comprehensive overview of the market",
        ] {
            let decision = router.route(q);
            assert!(decision.requires_analysis, "expected analytical: {q}");
            assert!(!decision.is_conversational);
        }
    }

    #[test]
    fn test_simple_retrieval_is_standard() {
        let router = QueryRouter::new();
        let decision = router.route("show me 5 rows");
        assert!(!decision.is_conversational);
        assert!(!decision.requires_analysis);
        assert!(!decision.is_edit);
        assert_eq!(decision.intent, "retrieve");
    }

    #[test]
    fn test_count_intent() {
        let router = QueryRouter::new();
        assert_eq!(router.route("how many consultants are there").intent, "count");
    }

    #[test]
    fn test_edit_detection() {
        let router = QueryRouter::new();
        let decision = router.route("delete all rows where country='ZZ'");
        assert!(decision.is_edit);
        assert!(!decision.requires_analysis);
        assert_eq!(decision.intent, "edit");
    }

    #[test]
    fn test_edit_wins_over_analytical() {
        let router = QueryRouter::new();
        let decision = router.route("update the rates across suppliers and regions");
        assert!(decision.is_edit);
        assert!(!decision.requires_analysis);
    }
}
