//! Named-instance registry.
//!
//! A small JSON file at `$HOME/.br/instances.json` maps instance names to
//! `{port, pid}`. The file is the single source of truth for which daemons
//! exist; every read probes each pid and silently drops dead entries,
//! rewriting the file when something was pruned. Writes go through a
//! temporary file and an atomic rename so concurrent readers never see a
//! torn file — a torn or malformed read is treated as an empty registry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::core::config::BASE_PORT;

const REGISTRY_FILE: &str = "instances.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub port: u16,
    pub pid: u32,
}

pub struct Registry {
    dir: PathBuf,
}

/// Probe whether a process with this pid currently exists.
pub fn pid_alive(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    sys.process(target).is_some()
}

impl Registry {
    /// The registry under the user's home directory.
    pub fn open() -> Self {
        let dir = dirs::home_dir()
            .map(|h| h.join(".br"))
            .unwrap_or_else(|| PathBuf::from(".br"));
        Self { dir }
    }

    /// A registry rooted at an explicit directory (tests).
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    fn read_raw(&self) -> BTreeMap<String, InstanceRecord> {
        match std::fs::read_to_string(self.file()) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => BTreeMap::new(),
        }
    }

    fn write(&self, entries: &BTreeMap<String, InstanceRecord>) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let tmp = self.dir.join(format!("{REGISTRY_FILE}.tmp"));
        let body = serde_json::to_string_pretty(entries)?;
        std::fs::write(&tmp, body).context("Failed to write registry")?;
        std::fs::rename(&tmp, self.file()).context("Failed to replace registry")?;
        Ok(())
    }

    /// Read the registry, dropping entries whose pid no longer responds to a
    /// liveness probe. The file is rewritten only when something was pruned.
    pub fn read(&self) -> Result<BTreeMap<String, InstanceRecord>> {
        let raw = self.read_raw();
        let live: BTreeMap<String, InstanceRecord> = raw
            .iter()
            .filter(|(_, rec)| pid_alive(rec.pid))
            .map(|(name, rec)| (name.clone(), rec.clone()))
            .collect();
        if live.len() != raw.len() {
            self.write(&live)?;
        }
        Ok(live)
    }

    /// Look up one instance by name (after pruning).
    pub fn lookup(&self, name: &str) -> Result<Option<InstanceRecord>> {
        Ok(self.read()?.remove(name))
    }

    pub fn register(&self, name: &str, port: u16, pid: u32) -> Result<()> {
        let mut entries = self.read()?;
        entries.insert(name.to_string(), InstanceRecord { port, pid });
        self.write(&entries)
    }

    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut entries = self.read()?;
        if entries.remove(name).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }

    /// Pick the lowest free port ≥ 3030: not claimed by a registered
    /// instance, and passing a local bind probe. The default instance gets
    /// 3030 on an empty registry by construction.
    pub fn allocate_port(&self) -> Result<u16> {
        let used: Vec<u16> = self.read()?.values().map(|r| r.port).collect();
        let mut port = BASE_PORT;
        loop {
            if !used.contains(&port) && bind_probe(port) {
                return Ok(port);
            }
            port = port
                .checked_add(1)
                .context("Ran out of ports to allocate")?;
        }
    }
}

fn bind_probe(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> (TempDir, Registry) {
        let dir = TempDir::new().unwrap();
        let reg = Registry::at(dir.path());
        (dir, reg)
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let (_dir, reg) = registry();
        assert!(reg.read().unwrap().is_empty());
    }

    #[test]
    fn malformed_file_reads_as_empty() {
        let (dir, reg) = registry();
        std::fs::write(dir.path().join(REGISTRY_FILE), "{not json").unwrap();
        assert!(reg.read().unwrap().is_empty());
    }

    #[test]
    fn register_and_lookup_round_trip() {
        let (_dir, reg) = registry();
        let me = std::process::id();
        reg.register("default", 3030, me).unwrap();
        reg.register("scratch", 3031, me).unwrap();

        let entries = reg.read().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            reg.lookup("default").unwrap(),
            Some(InstanceRecord {
                port: 3030,
                pid: me
            })
        );

        reg.unregister("default").unwrap();
        assert_eq!(reg.lookup("default").unwrap(), None);
        assert!(reg.lookup("scratch").unwrap().is_some());
    }

    #[test]
    fn dead_pids_are_pruned_from_map_and_file() {
        let (dir, reg) = registry();
        let me = std::process::id();
        // A pid far outside anything the kernel will have handed out.
        let dead = 3_999_999;
        reg.register("alive", 3030, me).unwrap();
        // Bypass read-side pruning to plant the dead entry.
        let mut entries = reg.read_raw();
        entries.insert(
            "dead".to_string(),
            InstanceRecord {
                port: 3031,
                pid: dead,
            },
        );
        reg.write(&entries).unwrap();

        let live = reg.read().unwrap();
        assert!(live.contains_key("alive"));
        assert!(!live.contains_key("dead"));

        // The file itself was repaired.
        let raw = std::fs::read_to_string(dir.path().join(REGISTRY_FILE)).unwrap();
        assert!(!raw.contains("dead"));
    }

    #[test]
    fn allocate_skips_registered_ports() {
        let (_dir, reg) = registry();
        let me = std::process::id();
        reg.register("a", 3030, me).unwrap();
        reg.register("b", 3031, me).unwrap();
        reg.register("c", 3033, me).unwrap();
        assert_eq!(reg.allocate_port().unwrap(), 3032);
    }

    #[test]
    fn empty_registry_allocates_base_port() {
        let (_dir, reg) = registry();
        assert_eq!(reg.allocate_port().unwrap(), 3030);
    }

    #[test]
    fn allocate_skips_ports_that_fail_the_bind_probe() {
        let (_dir, reg) = registry();
        // Hold 3030 open so the probe fails even with an empty registry.
        let holder = std::net::TcpListener::bind(("127.0.0.1", 3030));
        match holder {
            Ok(_guard) => assert_eq!(reg.allocate_port().unwrap(), 3031),
            // Another process already owns 3030; the allocator must skip it.
            Err(_) => assert!(reg.allocate_port().unwrap() > 3030),
        }
    }

    #[test]
    fn own_pid_probes_alive() {
        assert!(pid_alive(std::process::id()));
        assert!(!pid_alive(3_999_999));
    }
}
