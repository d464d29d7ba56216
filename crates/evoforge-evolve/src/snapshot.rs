use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use evoforge_core::error::Result;
use evoforge_core::types::AgentId;

use crate::agent::Agent;
use crate::population::Population;

pub const INIT_LABEL: &str = "init";

pub fn generation_label(generation: u32) -> String {
    format!("generation={}", generation)
}

/// Contents of `fitness.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessSnapshot {
    pub generation: u32,
    pub written_at: DateTime<Utc>,
    pub fitness: BTreeMap<AgentId, f64>,
}

/// Writes population snapshots as `<root>/<label>/agents/<id>.json` plus
/// `<root>/<label>/fitness.json`.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    root: PathBuf,
}

impl SnapshotWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn write(&self, label: &str, population: &Population) -> Result<PathBuf> {
        let dir = self.root.join(label);
        let agents_dir = dir.join("agents");
        tokio::fs::create_dir_all(&agents_dir).await?;

        for agent in population.agents() {
            let json = serde_json::to_vec_pretty(agent)?;
            tokio::fs::write(agents_dir.join(format!("{}.json", agent.id)), json).await?;
        }

        let fitness = FitnessSnapshot {
            generation: population.generation(),
            written_at: Utc::now(),
            fitness: population.fitness_map(),
        };
        tokio::fs::write(dir.join("fitness.json"), serde_json::to_vec_pretty(&fitness)?).await?;

        debug!(dir = %dir.display(), agents = population.len(), "Snapshot written");
        Ok(dir)
    }

    /// Read a snapshot back. Agents are sorted by id.
    pub async fn read(&self, label: &str) -> Result<(Vec<Agent>, FitnessSnapshot)> {
        let dir = self.root.join(label);
        let mut agents = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.join("agents")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let bytes = tokio::fs::read(entry.path()).await?;
            agents.push(serde_json::from_slice::<Agent>(&bytes)?);
        }
        agents.sort_by(|a, b| a.id.cmp(&b.id));

        let bytes = tokio::fs::read(dir.join("fitness.json")).await?;
        let fitness: FitnessSnapshot = serde_json::from_slice(&bytes)?;
        Ok((agents, fitness))
    }
}
