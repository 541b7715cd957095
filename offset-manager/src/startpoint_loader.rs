use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::error::OffsetManagerError;
use crate::model::{Ssp, Startpoint, TaskName};
use crate::traits::StartpointManager;

/// Reads pending fan-out entries from the startpoint store and filters them
/// against the registry. If nothing was loaded across all tasks the
/// startpoint manager is stopped immediately; otherwise it is left open so the
/// commit pipeline can remove entries as they are absorbed into checkpoints.
pub struct StartpointLoader<'a> {
    startpoint_manager: Option<&'a (dyn StartpointManager)>,
}

impl<'a> StartpointLoader<'a> {
    pub fn new(startpoint_manager: Option<&'a (dyn StartpointManager)>) -> Self {
        Self { startpoint_manager }
    }

    pub async fn load(
        &self,
        tasks: &HashMap<TaskName, HashSet<Ssp>>,
    ) -> Result<HashMap<TaskName, HashMap<Ssp, Startpoint>>, OffsetManagerError> {
        let Some(manager) = self.startpoint_manager else {
            return Ok(HashMap::new());
        };

        let mut result = HashMap::new();
        for (task, ssps) in tasks {
            let fan_out = manager
                .get_fan_out_for_task(task)
                .await
                .map_err(OffsetManagerError::Store)?;
            let Some(fan_out) = fan_out else {
                continue;
            };

            let filtered: HashMap<Ssp, Startpoint> = fan_out
                .into_iter()
                .filter(|(ssp, _)| ssps.contains(ssp))
                .collect();

            if !filtered.is_empty() {
                result.insert(task.clone(), filtered);
            }
        }

        if result.is_empty() {
            info!("no startpoints loaded for any task, stopping startpoint manager");
            manager.stop().await.map_err(OffsetManagerError::Store)?;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStartpointManager;

    #[tokio::test]
    async fn filters_fan_out_against_registered_ssps() {
        let manager = InMemoryStartpointManager::new();
        manager
            .seed(
                TaskName::new("t0"),
                HashMap::from([
                    (Ssp::new("sysA", "topicX", 0), Startpoint::Oldest),
                    (Ssp::new("sysA", "topicX", 1), Startpoint::Upcoming),
                ]),
            )
            .await;

        let mut tasks = HashMap::new();
        tasks.insert(
            TaskName::new("t0"),
            HashSet::from([Ssp::new("sysA", "topicX", 0)]),
        );

        let loader = StartpointLoader::new(Some(&manager));
        let loaded = loader.load(&tasks).await.unwrap();

        assert_eq!(loaded[&TaskName::new("t0")].len(), 1);
        assert!(loaded[&TaskName::new("t0")].contains_key(&Ssp::new("sysA", "topicX", 0)));
        assert!(!manager.is_stopped().await);
    }

    #[tokio::test]
    async fn stops_manager_when_nothing_loaded() {
        let manager = InMemoryStartpointManager::new();
        let tasks = HashMap::from([(TaskName::new("t0"), HashSet::new())]);

        let loader = StartpointLoader::new(Some(&manager));
        let loaded = loader.load(&tasks).await.unwrap();

        assert!(loaded.is_empty());
        assert!(manager.is_stopped().await);
    }
}
