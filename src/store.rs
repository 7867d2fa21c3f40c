//! Snapshot persistence for built graphs, one rkyv file per day type.
//! Used outside the query path only: `init`/`update` write, `serve` reads.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use log::info;

use crate::calendar::DayType;
use crate::graph::{GraphSet, TransitGraph};

pub struct GraphStore {
    dir: PathBuf,
}

impl GraphStore {
    pub fn new(dir: PathBuf) -> GraphStore {
        GraphStore { dir }
    }

    fn path_for(&self, day: DayType) -> PathBuf {
        self.dir.join(format!("graph_{}.rkyv", day.key()))
    }

    /// True when a snapshot file exists for every day type.
    pub fn is_complete(&self) -> bool {
        DayType::ALL.iter().all(|day| self.path_for(*day).exists())
    }

    pub fn save(&self, set: &GraphSet) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create graph dir {}", self.dir.display()))?;
        for (day, graph) in set.iter() {
            let bytes = rkyv::to_bytes::<_, 1024>(graph)
                .map_err(|e| anyhow!("serialize {day} graph: {e:?}"))?;
            let path = self.path_for(day);
            fs::write(&path, &bytes).with_context(|| format!("write {}", path.display()))?;
            info!("saved {day} graph to {}", path.display());
        }
        Ok(())
    }

    pub fn load(&self) -> Result<GraphSet> {
        let mut set = GraphSet::default();
        for day in DayType::ALL {
            let path = self.path_for(day);
            let bytes =
                fs::read(&path).with_context(|| format!("read graph snapshot {}", path.display()))?;
            let graph: TransitGraph = rkyv::from_bytes(&bytes)
                .map_err(|e| anyhow!("deserialize {}: {e:?}", path.display()))?;
            info!(
                "loaded {day} graph: {} nodes, {} edges",
                graph.node_count(),
                graph.edge_count()
            );
            set.insert(day, graph);
        }
        Ok(set)
    }
}
