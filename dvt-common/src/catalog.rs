//! Static catalog of launchable compatibility test categories.
//!
//! The dashboard identifies categories with hyphenated ids (`boot-drive`)
//! while the backend names runs after underscored test types (`boot_drive`)
//! and builds run ids as `<test_type>_<timestamp>`. Mapping between the two is
//! an explicit table lookup, never a free substring search.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A launchable test category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestCategory {
    BootDrive,
    DataDrive,
    SystemRobustness,
    Certification,
}

impl TestCategory {
    pub const ALL: [TestCategory; 4] = [
        TestCategory::BootDrive,
        TestCategory::DataDrive,
        TestCategory::SystemRobustness,
        TestCategory::Certification,
    ];

    /// Dashboard-side id, also used in the launch route.
    pub fn id(self) -> &'static str {
        match self {
            Self::BootDrive => "boot-drive",
            Self::DataDrive => "data-drive",
            Self::SystemRobustness => "system-robustness",
            Self::Certification => "certification",
        }
    }

    /// Backend test type.
    pub fn test_type(self) -> &'static str {
        match self {
            Self::BootDrive => "boot_drive",
            Self::DataDrive => "data_drive",
            Self::SystemRobustness => "system_robustness",
            Self::Certification => "certification",
        }
    }

    pub fn definition(self) -> &'static TestDefinition {
        CATALOG
            .iter()
            .find(|def| def.category == self)
            .unwrap_or(&CATALOG[0])
    }

    /// Resolve a category from either naming convention.
    ///
    /// Both sides are canonicalized by lowercasing and replacing `-` with `_`
    /// before an exact comparison against the table.
    pub fn from_id(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        Self::ALL
            .into_iter()
            .find(|category| category.test_type() == normalized)
    }

    /// Category that a run id belongs to.
    ///
    /// A run id denotes the category whose test type is the longest prefix
    /// `p` of the normalized id with the id either equal to `p` or continuing
    /// with `_`. `boot_drive_17` maps to `BootDrive`; `boot_drivex` maps to
    /// nothing.
    pub fn for_test_id(test_id: &str) -> Option<Self> {
        let normalized = normalize(test_id);
        Self::ALL
            .into_iter()
            .filter(|category| {
                let prefix = category.test_type();
                normalized
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
            })
            .max_by_key(|category| category.test_type().len())
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', "_")
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Unknown category id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown test category '{0}' (expected one of: boot-drive, data-drive, system-robustness, certification)")]
pub struct UnknownCategory(pub String);

impl FromStr for TestCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Display metadata for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestDefinition {
    pub category: TestCategory,
    pub name: &'static str,
    pub description: &'static str,
    pub sub_checks: &'static [&'static str],
}

pub static CATALOG: [TestDefinition; 4] = [
    TestDefinition {
        category: TestCategory::BootDrive,
        name: "Boot Drive",
        description: "OS installation, boot and post-boot usability on the SSD as system drive",
        sub_checks: &[
            "ubuntu install/boot/usability",
            "centos install/boot/usability",
            "windows_2019 install/boot/usability",
        ],
    },
    TestDefinition {
        category: TestCategory::DataDrive,
        name: "Data Drive",
        description: "Workload validation on one or more data drives, including software RAID",
        sub_checks: &[
            "direct_access",
            "filesystem_access",
            "sw_raid_access (raid_0, raid_1, raid_5, raid_6)",
        ],
    },
    TestDefinition {
        category: TestCategory::SystemRobustness,
        name: "System Robustness",
        description: "Power cycles, resets and hot-plug events with data integrity checks",
        sub_checks: &[
            "ac_power_cycle",
            "ipmi_power_cycle",
            "ipmi_reboot",
            "os_reboot",
            "smbus_monitoring",
            "ctrl_reset",
            "nssr_reset",
            "flr_reset",
            "hot_reset",
            "quarch_hot_swap",
            "quarch_glitch",
            "nvme_mi_openbmc",
            "itp_cscript",
        ],
    },
    TestDefinition {
        category: TestCategory::Certification,
        name: "Certification",
        description: "Vendor and platform certification suites",
        sub_checks: &[
            "intel_vroc",
            "whql",
            "intel_windows_nvme_driver",
            "intel_esxi_vmd_driver",
            "uefi_2_7",
        ],
    },
];
