//! Guard：医学相关性三层判定
//!
//! 1. 关键词子串匹配；2. 动词短语子串匹配；3. 托管模型 YES/NO 分类。
//! 第三层模型调用失败时放行（fail open），因此 Guard 不能作为供应商故障期间的硬性拒绝手段。
//! 未配置分类模型（离线 Mock 模式）时第三层同样放行。

use std::sync::Arc;

use crate::config::GuardSection;
use crate::llm::LlmClient;

/// 判定结果：是否放行 + 原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardVerdict {
    pub admitted: bool,
    pub reason: String,
}

impl GuardVerdict {
    fn admit(reason: impl Into<String>) -> Self {
        Self {
            admitted: true,
            reason: reason.into(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            admitted: false,
            reason: reason.into(),
        }
    }
}

pub struct GuardService {
    classifier: Option<Arc<dyn LlmClient>>,
    keywords: Vec<String>,
    verbs: Vec<String>,
}

impl GuardService {
    pub fn new(llm: Arc<dyn LlmClient>, cfg: &GuardSection) -> Self {
        tracing::info!(
            keywords = cfg.medical_keywords.len(),
            verbs = cfg.medical_verbs.len(),
            "guard service initialized"
        );
        Self {
            classifier: Some(llm),
            keywords: cfg.medical_keywords.iter().map(|k| k.to_lowercase()).collect(),
            verbs: cfg.medical_verbs.iter().map(|v| v.to_lowercase()).collect(),
        }
    }

    /// 关闭第三层模型分类（仅保留关键词与动词匹配）
    pub fn without_classifier(mut self) -> Self {
        self.classifier = None;
        self
    }

    pub async fn is_medical_query(&self, query: &str) -> GuardVerdict {
        let lower = query.to_lowercase();

        if self.keywords.iter().any(|k| lower.contains(k.as_str())) {
            return GuardVerdict::admit("Medical keywords detected");
        }

        if self.verbs.iter().any(|v| lower.contains(v.as_str())) {
            return GuardVerdict::admit("Medical context detected");
        }

        let Some(llm) = &self.classifier else {
            return GuardVerdict::admit("No classifier configured - allowing");
        };
        match llm.generate_text(&validation_prompt(query)).await {
            Ok(response) => {
                let response = response.trim();
                if response.to_uppercase().starts_with("YES") {
                    GuardVerdict::admit("LLM validated as medical")
                } else {
                    let reason = response
                        .split_once('-')
                        .map(|(_, r)| r.trim())
                        .filter(|r| !r.is_empty())
                        .unwrap_or("Not medical");
                    GuardVerdict::reject(reason)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM validation failed, allowing query");
                GuardVerdict::admit("Validation inconclusive - allowing")
            }
        }
    }

    /// 面向用户的拒绝文案
    pub fn rejection_message(&self, reason: &str) -> String {
        format!(
            "I apologize, but I'm a specialized medical AI assistant.\n\n\
             Reason: {reason}\n\n\
             I can help with:\n\
             - Medical conditions and symptoms\n\
             - Treatment options and medications\n\
             - Medical image analysis\n\
             - Clinical guidelines\n\
             - Health calculations\n\n\
             Please ask a medical or healthcare question!"
        )
    }
}

fn validation_prompt(query: &str) -> String {
    format!(
        "Is this query medical/healthcare related?\n\n\
         Query: \"{query}\"\n\n\
         Respond ONLY with \"YES\" or \"NO\" followed by brief reason.\n\n\
         Examples:\n\
         - \"What are flu symptoms?\" → YES - disease symptoms\n\
         - \"Analyze this X-ray\" → YES - medical image\n\
         - \"What's the weather?\" → NO - not medical\n\n\
         Response:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn guard_with(mock: MockLlmClient) -> (GuardService, Arc<MockLlmClient>) {
        let mock = Arc::new(mock);
        (GuardService::new(mock.clone(), &GuardSection::default()), mock)
    }

    #[tokio::test]
    async fn test_keyword_layer_skips_llm() {
        let (guard, mock) = guard_with(MockLlmClient::new());
        let v = guard.is_medical_query("What are the SYMPTOMS of measles?").await;
        assert!(v.admitted);
        assert_eq!(v.reason, "Medical keywords detected");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_verb_layer() {
        let (guard, mock) = guard_with(MockLlmClient::new());
        let v = guard.is_medical_query("Can you look at this for me?").await;
        assert!(v.admitted);
        assert_eq!(v.reason, "Medical context detected");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_llm_layer_admits_on_yes() {
        let (guard, mock) = guard_with(MockLlmClient::scripted(["yes - vaccination question"]));
        let v = guard.is_medical_query("Should my kid get the MMR shot?").await;
        assert!(v.admitted);
        assert_eq!(v.reason, "LLM validated as medical");
        let prompt = &mock.request(0).unwrap()[0].content;
        assert!(prompt.contains("Query: \"Should my kid get the MMR shot?\""));
    }

    #[tokio::test]
    async fn test_llm_layer_rejects_with_reason() {
        let (guard, _) = guard_with(MockLlmClient::scripted(["NO - weather forecast"]));
        let v = guard.is_medical_query("Will it rain tomorrow?").await;
        assert!(!v.admitted);
        assert_eq!(v.reason, "weather forecast");
    }

    #[tokio::test]
    async fn test_llm_layer_rejects_without_reason() {
        let (guard, _) = guard_with(MockLlmClient::scripted(["NO"]));
        let v = guard.is_medical_query("Will it rain tomorrow?").await;
        assert!(!v.admitted);
        assert_eq!(v.reason, "Not medical");
    }

    #[tokio::test]
    async fn test_fails_open_when_llm_errors() {
        let mock = MockLlmClient::new();
        mock.push_error("503 upstream unavailable");
        let (guard, _) = guard_with(mock);
        let v = guard.is_medical_query("Will it rain tomorrow?").await;
        assert!(v.admitted);
        assert_eq!(v.reason, "Validation inconclusive - allowing");
    }

    #[tokio::test]
    async fn test_without_classifier_admits_unmatched_queries() {
        let (guard, mock) = guard_with(MockLlmClient::new());
        let guard = guard.without_classifier();
        let v = guard.is_medical_query("Will it rain tomorrow?").await;
        assert!(v.admitted);
        assert_eq!(v.reason, "No classifier configured - allowing");
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_rejection_message_includes_reason() {
        let (guard, _) = guard_with(MockLlmClient::new());
        let msg = guard.rejection_message("weather forecast");
        assert!(msg.contains("Reason: weather forecast"));
        assert!(msg.contains("Please ask a medical or healthcare question!"));
    }
}
