use crate::config::SubjectDef;
use crate::model::SubjectProfile;
use async_trait::async_trait;
use std::collections::HashMap;

/// External subject-profile store. The engine and the analyzer only ever
/// reference subjects by id; attribute maps live here.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn resolve(&self, ids: &[String]) -> anyhow::Result<HashMap<String, SubjectProfile>>;
}

/// Profile store backed by the subject list of a survey definition. Ids not
/// present resolve to an empty profile rather than an error: a missing
/// profile degrades prompt quality, it does not block the interview.
pub struct StaticProfiles {
    profiles: HashMap<String, SubjectProfile>,
}

impl StaticProfiles {
    pub fn new(profiles: Vec<SubjectProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn from_defs(defs: &[SubjectDef]) -> Self {
        Self::new(
            defs.iter()
                .map(|d| SubjectProfile {
                    id: d.id.clone(),
                    display_name: d.name.clone(),
                    attributes: d.attributes.clone(),
                })
                .collect(),
        )
    }
}

#[async_trait]
impl ProfileStore for StaticProfiles {
    async fn resolve(&self, ids: &[String]) -> anyhow::Result<HashMap<String, SubjectProfile>> {
        Ok(ids
            .iter()
            .map(|id| {
                let p = self.profiles.get(id).cloned().unwrap_or_else(|| SubjectProfile {
                    id: id.clone(),
                    display_name: id.clone(),
                    attributes: Default::default(),
                });
                (id.clone(), p)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_ids_resolve_to_empty_profiles() {
        let store = StaticProfiles::new(vec![SubjectProfile {
            id: "a".into(),
            display_name: "A".into(),
            attributes: Default::default(),
        }]);
        let out = store
            .resolve(&["a".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out["a"].display_name, "A");
        assert_eq!(out["ghost"].display_name, "ghost");
    }
}
