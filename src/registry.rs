//! The service registry's `List()`/`Get(id)` read interface and health
//! status function (spec 1, 4.6) - the registry's own storage of health
//! state is an external collaborator; this crate only consumes it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub agent_id: String,
    pub endpoint: String,
    pub last_seen: DateTime<Utc>,
}

const DEGRADED_AFTER: Duration = Duration::seconds(60);
const UNHEALTHY_AFTER: Duration = Duration::seconds(180);

/// `DetermineStatus(last_seen, now)` (spec 4.6 step 1): an agent more than
/// 180s stale is unhealthy and skipped entirely; one more than 60s stale
/// is degraded but still polled.
pub fn determine_status(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> AgentHealth {
    let age = now - last_seen;
    if age > UNHEALTHY_AFTER {
        AgentHealth::Unhealthy
    } else if age > DEGRADED_AFTER {
        AgentHealth::Degraded
    } else {
        AgentHealth::Healthy
    }
}

/// Read-only view onto the service registry's agent list and health
/// state. Implemented elsewhere (the registry owns its own storage per
/// spec 1); this crate only calls `list`/`get`.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<Agent>>;
    async fn get(&self, agent_id: &str) -> anyhow::Result<Option<Agent>>;
}

/// Returns the agents a poll cycle should query: healthy or degraded,
/// never unhealthy (spec 4.6 step 1).
pub fn pollable_agents(agents: Vec<Agent>, now: DateTime<Utc>) -> Vec<Agent> {
    agents
        .into_iter()
        .filter(|a| determine_status(a.last_seen, now) != AgentHealth::Unhealthy)
        .collect()
}

#[derive(Debug, serde::Deserialize)]
struct RegistryEntry {
    agent_id: String,
    endpoint: String,
    last_seen: DateTime<Utc>,
}

impl From<RegistryEntry> for Agent {
    fn from(entry: RegistryEntry) -> Self {
        Agent { agent_id: entry.agent_id, endpoint: entry.endpoint, last_seen: entry.last_seen }
    }
}

/// `reqwest`-backed [`AgentRegistry`] consuming the `List()`/`Get(id)`
/// read interface spec.md §1 describes as an external collaborator - the
/// registry's own storage of health state lives outside this crate, the
/// same way [`crate::client::HttpAgentClient`] only fixes the wire shape
/// of the RPC surface it consumes.
pub struct HttpAgentRegistry {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAgentRegistry {
    pub fn new(base_url: String) -> Self {
        Self { http: reqwest::Client::new(), base_url }
    }
}

#[async_trait]
impl AgentRegistry for HttpAgentRegistry {
    async fn list(&self) -> anyhow::Result<Vec<Agent>> {
        let url = format!("{}/agents", self.base_url);
        let entries: Vec<RegistryEntry> = self.http.get(&url).send().await?.error_for_status()?.json().await?;
        Ok(entries.into_iter().map(Agent::from).collect())
    }

    async fn get(&self, agent_id: &str) -> anyhow::Result<Option<Agent>> {
        let url = format!("{}/agents/{}", self.base_url, agent_id);
        let resp = self.http.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entry: RegistryEntry = resp.error_for_status()?.json().await?;
        Ok(Some(Agent::from(entry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_agent_is_healthy() {
        let now = Utc::now();
        assert_eq!(determine_status(now, now), AgentHealth::Healthy);
    }

    #[test]
    fn stale_agent_is_degraded() {
        let now = Utc::now();
        let last_seen = now - Duration::seconds(90);
        assert_eq!(determine_status(last_seen, now), AgentHealth::Degraded);
    }

    #[test]
    fn very_stale_agent_is_unhealthy() {
        let now = Utc::now();
        let last_seen = now - Duration::seconds(200);
        assert_eq!(determine_status(last_seen, now), AgentHealth::Unhealthy);
    }

    #[test]
    fn pollable_agents_excludes_unhealthy() {
        let now = Utc::now();
        let agents = vec![
            Agent { agent_id: "a".to_string(), endpoint: "http://a".to_string(), last_seen: now },
            Agent {
                agent_id: "b".to_string(),
                endpoint: "http://b".to_string(),
                last_seen: now - Duration::seconds(300),
            },
        ];
        let pollable = pollable_agents(agents, now);
        assert_eq!(pollable.len(), 1);
        assert_eq!(pollable[0].agent_id, "a");
    }
}
