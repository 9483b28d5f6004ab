//! Constants mirroring libvirt's storage enums, and typed views over them.

use serde::{Deserialize, Serialize};

/// `virStoragePoolState`
pub mod pool_state {
    pub const INACTIVE: i32 = 0;
    pub const BUILDING: i32 = 1;
    pub const RUNNING: i32 = 2;
    pub const DEGRADED: i32 = 3;
    pub const INACCESSIBLE: i32 = 4;
}

/// `virStoragePoolBuildFlags`
pub mod pool_build {
    pub const NEW: u32 = 0;
    pub const REPAIR: u32 = 1;
    pub const RESIZE: u32 = 2;
}

/// `virStoragePoolDeleteFlags`
pub mod pool_delete {
    pub const NORMAL: u32 = 0;
    pub const ZEROED: u32 = 1;
}

/// `virStorageVolType`
pub mod vol_type {
    pub const FILE: i32 = 0;
    pub const BLOCK: i32 = 1;
}

/// `virStorageVolDeleteFlags`
pub mod vol_delete {
    pub const NORMAL: u32 = 0;
    pub const ZEROED: u32 = 1;
}

/// Host-reported state of a storage pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Inactive,
    Building,
    Running,
    Degraded,
    Inaccessible,
    /// A value newer than this binding knows about.
    Unknown(i32),
}

impl PoolState {
    /// Convert libvirt pool state to PoolState.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            pool_state::INACTIVE => PoolState::Inactive,
            pool_state::BUILDING => PoolState::Building,
            pool_state::RUNNING => PoolState::Running,
            pool_state::DEGRADED => PoolState::Degraded,
            pool_state::INACCESSIBLE => PoolState::Inaccessible,
            other => PoolState::Unknown(other),
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            PoolState::Inactive => pool_state::INACTIVE,
            PoolState::Building => pool_state::BUILDING,
            PoolState::Running => pool_state::RUNNING,
            PoolState::Degraded => pool_state::DEGRADED,
            PoolState::Inaccessible => pool_state::INACCESSIBLE,
            PoolState::Unknown(raw) => *raw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolState::Inactive => "inactive",
            PoolState::Building => "building",
            PoolState::Running => "running",
            PoolState::Degraded => "degraded",
            PoolState::Inaccessible => "inaccessible",
            PoolState::Unknown(_) => "unknown",
        }
    }
}

/// Kind of a storage volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolType {
    File,
    Block,
    Unknown(i32),
}

impl VolType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            vol_type::FILE => VolType::File,
            vol_type::BLOCK => VolType::Block,
            other => VolType::Unknown(other),
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            VolType::File => vol_type::FILE,
            VolType::Block => vol_type::BLOCK,
            VolType::Unknown(raw) => *raw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolType::File => "file",
            VolType::Block => "block",
            VolType::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_state_raw_values() {
        assert_eq!(PoolState::from_raw(0), PoolState::Inactive);
        assert_eq!(PoolState::from_raw(2), PoolState::Running);
        assert_eq!(PoolState::from_raw(4), PoolState::Inaccessible);
        assert_eq!(PoolState::from_raw(9), PoolState::Unknown(9));

        for raw in 0..6 {
            assert_eq!(PoolState::from_raw(raw).as_raw(), raw);
        }
    }

    #[test]
    fn test_vol_type_raw_values() {
        assert_eq!(VolType::from_raw(vol_type::FILE), VolType::File);
        assert_eq!(VolType::from_raw(vol_type::BLOCK), VolType::Block);
        assert_eq!(VolType::Block.as_str(), "block");
        assert_eq!(VolType::from_raw(3).as_raw(), 3);
    }
}
