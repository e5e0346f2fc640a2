//! Lead store: candidate targets grouped by discovery keyword, with a
//! used flag so a prospect is messaged at most once.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use outreach_core::services::{LeadRecord, LeadStore};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// In-memory lead store keyed by profile handle.
#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: DashMap<String, LeadRecord>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<LeadRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Load leads from a JSON array file.
    pub fn load_json(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<LeadRecord> = serde_json::from_str(&raw)?;
        info!(path = %path.display(), leads = records.len(), "Lead store loaded");
        Ok(Self::from_records(records))
    }

    pub fn insert(&self, record: LeadRecord) {
        self.leads.insert(record.profile.clone(), record);
    }

    pub fn get(&self, profile: &str) -> Option<LeadRecord> {
        self.leads.get(profile).map(|l| l.clone())
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    /// All leads, oldest discovery first.
    pub fn records(&self) -> Vec<LeadRecord> {
        let mut records: Vec<LeadRecord> = self.leads.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| a.found_at.cmp(&b.found_at).then_with(|| a.profile.cmp(&b.profile)));
        records
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn keywords(&self) -> anyhow::Result<Vec<String>> {
        let keywords: BTreeSet<String> = self
            .leads
            .iter()
            .filter(|e| !e.value().used)
            .map(|e| e.value().keyword.clone())
            .collect();
        Ok(keywords.into_iter().collect())
    }

    async fn candidates(&self, keyword: &str, limit: usize) -> anyhow::Result<Vec<LeadRecord>> {
        let mut candidates: Vec<LeadRecord> = self
            .records()
            .into_iter()
            .filter(|l| !l.used && l.keyword == keyword)
            .collect();
        candidates.truncate(limit);
        debug!(keyword = %keyword, found = candidates.len(), "Lead candidates listed");
        Ok(candidates)
    }

    async fn mark_used(&self, handles: &[String]) -> anyhow::Result<usize> {
        let now = Utc::now();
        let mut updated = 0;
        for handle in handles {
            if let Some(mut lead) = self.leads.get_mut(handle) {
                lead.used = true;
                lead.used_at = Some(now);
                updated += 1;
            }
        }
        info!(requested = handles.len(), updated, "Leads marked as used");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lead(profile: &str, keyword: &str, minutes_ago: i64) -> LeadRecord {
        LeadRecord {
            profile: profile.to_string(),
            username: Some(profile.to_string()),
            full_name: None,
            keyword: keyword.to_string(),
            action: Some("follow".to_string()),
            found_at: Some(Utc::now() - Duration::minutes(minutes_ago)),
            used: false,
            used_at: None,
        }
    }

    fn store() -> InMemoryLeadStore {
        InMemoryLeadStore::from_records(vec![
            lead("ana", "fotografia", 30),
            lead("beto", "fotografia", 20),
            lead("carla", "yoga", 10),
            lead("dani", "fotografia", 5),
        ])
    }

    #[tokio::test]
    async fn test_keywords_distinct_and_unused_only() {
        let store = store();
        assert_eq!(store.keywords().await.unwrap(), vec!["fotografia", "yoga"]);

        store.mark_used(&["carla".to_string()]).await.unwrap();
        assert_eq!(store.keywords().await.unwrap(), vec!["fotografia"]);
    }

    #[tokio::test]
    async fn test_candidates_filtered_and_limited() {
        let store = store();
        let found = store.candidates("fotografia", 2).await.unwrap();
        let profiles: Vec<&str> = found.iter().map(|l| l.profile.as_str()).collect();
        assert_eq!(profiles, vec!["ana", "beto"]);

        store.mark_used(&["ana".to_string()]).await.unwrap();
        let found = store.candidates("fotografia", 20).await.unwrap();
        let profiles: Vec<&str> = found.iter().map(|l| l.profile.as_str()).collect();
        assert_eq!(profiles, vec!["beto", "dani"]);
    }

    #[tokio::test]
    async fn test_mark_used_sets_timestamp_and_ignores_unknown() {
        let store = store();
        let updated = store
            .mark_used(&["beto".to_string(), "nobody".to_string()])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let beto = store.get("beto").unwrap();
        assert!(beto.used);
        assert!(beto.used_at.is_some());
        assert!(!store.get("ana").unwrap().used);
    }

    #[test]
    fn test_load_json() {
        let path = std::env::temp_dir().join(format!("outreach-leads-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"profile":"ana","keyword":"yoga"},{"profile":"beto","keyword":"yoga","used":true}]"#,
        )
        .unwrap();

        let store = InMemoryLeadStore::load_json(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("beto").unwrap().used);
        std::fs::remove_file(&path).unwrap();
    }
}
