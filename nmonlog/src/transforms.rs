// Platform-specific derived metrics, computed while the data are read.
//
// A transform claims a set of type ids.  For a claimed type it decides the final field list when
// the type is defined, and rewrites every raw row of the type into a row in that field order.
// All the transforms here are append-only: the raw fields are kept in place as a prefix and the
// derived fields follow them.
//
// The pipeline is selected once per file, from the platform, and the first transform that claims
// a type id is the only one applied to it.

use crate::DataType;

use anyhow::{anyhow, bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Aix,
    Linux,
}

impl Platform {
    /// TOP rows end with the command name on Linux, and the command name and WLM class on AIX.

    pub fn top_trailing_columns(self) -> usize {
        match self {
            Platform::Aix => 2,
            Platform::Linux => 1,
        }
    }

    /// The index of the first field of the command line in a UARG row.

    pub fn uarg_command_index(self) -> usize {
        match self {
            Platform::Aix => 8,
            Platform::Linux => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    CpuBusy,
    DiskTotal,
    AixMemory,
    AixLpar,
    AixCpu,
    LinuxNetPacket,
    LinuxMemory,
}

// Disk types that have a total.  Many disks are split across numbered continuation types, eg
// DISKREAD1, DISKREAD2.
const DISK_TYPES: [&str; 5] = ["DISKBUSY", "DISKREAD", "DISKWRITE", "DISKXFER", "DISKRXFER"];

impl Transform {
    pub fn name(self) -> &'static str {
        match self {
            Transform::CpuBusy => "CPUBusyTransform",
            Transform::DiskTotal => "DiskTotalTransform",
            Transform::AixMemory => "AIXMemoryTransform",
            Transform::AixLpar => "AIXLPARTransform",
            Transform::AixCpu => "AIXCPUTransform",
            Transform::LinuxNetPacket => "LinuxNetPacketTransform",
            Transform::LinuxMemory => "LinuxMemoryTransform",
        }
    }

    pub fn claims(self, type_id: &str) -> bool {
        match self {
            Transform::CpuBusy => type_id.starts_with("CPU"),
            Transform::DiskTotal => DISK_TYPES.contains(&type_id.trim_end_matches(|c: char| c.is_ascii_digit())),
            Transform::AixMemory | Transform::LinuxMemory => type_id == "MEM",
            Transform::AixLpar => type_id == "LPAR",
            Transform::AixCpu => type_id.starts_with("PCPU") || type_id.starts_with("SCPU"),
            Transform::LinuxNetPacket => type_id == "NETPACKET",
        }
    }

    fn derived_fields(self) -> &'static [&'static str] {
        match self {
            Transform::CpuBusy => &["CPU%"],
            Transform::DiskTotal => &["Total"],
            Transform::AixMemory => &["Real Used(MB)", "Virtual Used(MB)"],
            Transform::AixLpar => &["%Entitlement Used", "%Pool Used"],
            Transform::AixCpu => &["Total", "CPU%"],
            Transform::LinuxNetPacket => &["read-total/s", "write-total/s"],
            Transform::LinuxMemory => &["memused", "realfree", "realused", "swapused"],
        }
    }

    /// The final field list for a claimed type with raw fields `raw`.

    pub fn build_fields(self, raw: Vec<String>) -> Vec<String> {
        let mut fields = raw;
        fields.extend(self.derived_fields().iter().map(|f| f.to_string()));
        fields
    }

    /// Rewrite a raw row of `ty`, which must be a type whose fields were built by this transform.
    /// On failure the caller keeps the raw row.

    /// The number of values in a raw row of `ty`, before the derived fields are added.

    pub fn raw_field_count(self, ty: &DataType) -> usize {
        ty.field_count().saturating_sub(self.derived_fields().len())
    }

    pub fn apply(self, ty: &DataType, raw: &[f64]) -> Result<Vec<f64>> {
        let raw_count = self.raw_field_count(ty);
        if raw.len() != raw_count {
            bail!("expected {} raw values but got {}", raw_count, raw.len());
        }
        let field = |name: &str| -> Result<f64> {
            ty.field_index(name)
                .and_then(|ix| raw.get(ix).copied())
                .ok_or_else(|| anyhow!("no field '{}'", name))
        };
        let derived = match self {
            Transform::CpuBusy => vec![field("User%")? + field("Sys%")?],
            Transform::DiskTotal => {
                let sum = raw.iter().sum::<f64>();
                if ty.id().starts_with("DISKBUSY") {
                    vec![if raw.is_empty() { 0.0 } else { sum / raw.len() as f64 }]
                } else {
                    vec![sum]
                }
            }
            Transform::AixMemory => vec![
                field("Real total(MB)")? - field("Real free(MB)")?,
                field("Virtual total(MB)")? - field("Virtual free(MB)")?,
            ],
            Transform::AixLpar => {
                let physical = field("PhysicalCPU")?;
                vec![
                    percent_of(physical, field("entitled")?),
                    percent_of(physical, field("poolCPUs")?),
                ]
            }
            Transform::AixCpu => {
                let busy = field("User")? + field("Sys")?;
                let total = busy + field("Wait")? + field("Idle")?;
                vec![total, percent_of(busy, total)]
            }
            Transform::LinuxNetPacket => vec![
                sum_fields(ty, raw, "-read/s"),
                sum_fields(ty, raw, "-write/s"),
            ],
            Transform::LinuxMemory => {
                let memtotal = field("memtotal")?;
                let memfree = field("memfree")?;
                let realfree = memfree + field("cached")? + field("buffers")?;
                vec![
                    memtotal - memfree,
                    realfree,
                    memtotal - realfree,
                    field("swaptotal")? - field("swapfree")?,
                ]
            }
        };
        let mut row = raw.to_vec();
        row.extend(derived);
        Ok(row)
    }
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        100.0 * part / whole
    }
}

// Sum of the raw values of the per-interface fields with the given suffix, loopback excluded.
fn sum_fields(ty: &DataType, raw: &[f64], suffix: &str) -> f64 {
    ty.fields()
        .iter()
        .zip(raw)
        .filter(|(f, _)| f.ends_with(suffix) && !f.starts_with("lo-"))
        .map(|(_, v)| v)
        .sum()
}

/// The transforms in effect for one file.

#[derive(Debug, Clone)]
pub struct TransformPipeline {
    transforms: Vec<Transform>,
}

impl TransformPipeline {
    pub fn for_platform(platform: Platform) -> TransformPipeline {
        let mut transforms = vec![Transform::CpuBusy, Transform::DiskTotal];
        match platform {
            Platform::Aix => transforms.extend([Transform::AixMemory, Transform::AixLpar, Transform::AixCpu]),
            Platform::Linux => transforms.extend([Transform::LinuxNetPacket, Transform::LinuxMemory]),
        }
        TransformPipeline { transforms }
    }

    /// The transform that claims `type_id`, if any.

    pub fn find(&self, type_id: &str) -> Option<Transform> {
        self.transforms.iter().copied().find(|t| t.claims(type_id))
    }
}

#[cfg(test)]
fn make_type(id: &str, transform: Transform, raw: &[&str]) -> crate::Dataset {
    let mut ds = crate::Dataset::new("test");
    let fields = transform.build_fields(raw.iter().map(|f| f.to_string()).collect());
    ds.add_type(id.to_string(), id.to_string(), fields);
    ds
}

#[test]
fn test_pipeline_selection() {
    let linux = TransformPipeline::for_platform(Platform::Linux);
    let aix = TransformPipeline::for_platform(Platform::Aix);

    assert!(linux.find("CPU_ALL") == Some(Transform::CpuBusy));
    assert!(linux.find("CPU012") == Some(Transform::CpuBusy));
    assert!(linux.find("DISKREAD") == Some(Transform::DiskTotal));
    assert!(linux.find("DISKREAD3") == Some(Transform::DiskTotal));
    assert!(linux.find("DISKREADSERV").is_none());
    assert!(linux.find("MEM") == Some(Transform::LinuxMemory));
    assert!(linux.find("NETPACKET") == Some(Transform::LinuxNetPacket));
    assert!(linux.find("LPAR").is_none());
    assert!(linux.find("PCPU_ALL").is_none());

    assert!(aix.find("MEM") == Some(Transform::AixMemory));
    assert!(aix.find("LPAR") == Some(Transform::AixLpar));
    assert!(aix.find("SCPU01") == Some(Transform::AixCpu));
    assert!(aix.find("NETPACKET").is_none());
    assert!(aix.find("JFSFILE").is_none());
}

#[test]
fn test_cpu_busy() {
    let ds = make_type("CPU_ALL", Transform::CpuBusy, &["User%", "Sys%", "Wait%", "Idle%"]);
    let ty = ds.get_type("CPU_ALL").unwrap();
    assert!(ty.fields().last().unwrap() == "CPU%");
    let row = Transform::CpuBusy.apply(ty, &[10.0, 5.0, 1.0, 84.0]).unwrap();
    assert!(row == vec![10.0, 5.0, 1.0, 84.0, 15.0]);

    // Short raw rows are not transformed
    assert!(Transform::CpuBusy.apply(ty, &[10.0, 5.0]).is_err());
}

#[test]
fn test_disk_total() {
    let ds = make_type("DISKBUSY", Transform::DiskTotal, &["sda", "sdb"]);
    let ty = ds.get_type("DISKBUSY").unwrap();
    assert!(Transform::DiskTotal.apply(ty, &[10.0, 30.0]).unwrap() == vec![10.0, 30.0, 20.0]);

    let ds = make_type("DISKREAD1", Transform::DiskTotal, &["sda", "sdb", "sdc"]);
    let ty = ds.get_type("DISKREAD1").unwrap();
    assert!(Transform::DiskTotal.apply(ty, &[1.0, 2.0, 3.0]).unwrap() == vec![1.0, 2.0, 3.0, 6.0]);
}

#[test]
fn test_linux_memory() {
    let ds = make_type(
        "MEM",
        Transform::LinuxMemory,
        &["memtotal", "swaptotal", "memfree", "swapfree", "cached", "buffers"],
    );
    let ty = ds.get_type("MEM").unwrap();
    let row = Transform::LinuxMemory.apply(ty, &[8000.0, 2048.0, 3000.0, 2000.0, 1500.0, 500.0]).unwrap();
    assert!(row[6..] == [5000.0, 5000.0, 3000.0, 48.0]);
}

#[test]
fn test_missing_field() {
    let ds = make_type("MEM", Transform::LinuxMemory, &["memtotal", "memfree"]);
    let ty = ds.get_type("MEM").unwrap();
    let err = Transform::LinuxMemory.apply(ty, &[8000.0, 3000.0]).unwrap_err();
    assert!(err.to_string() == "no field 'cached'");
}

#[test]
fn test_linux_net_packet() {
    let ds = make_type(
        "NETPACKET",
        Transform::LinuxNetPacket,
        &["lo-read/s", "eth0-read/s", "eth1-read/s", "lo-write/s", "eth0-write/s", "eth1-write/s"],
    );
    let ty = ds.get_type("NETPACKET").unwrap();
    let row = Transform::LinuxNetPacket.apply(ty, &[5.0, 50.0, 7.0, 5.0, 60.0, 3.0]).unwrap();
    assert!(row[6..] == [57.0, 63.0]);
}

#[test]
fn test_aix_transforms() {
    let ds = make_type("LPAR", Transform::AixLpar, &["PhysicalCPU", "virtualCPUs", "poolCPUs", "entitled"]);
    let ty = ds.get_type("LPAR").unwrap();
    let row = Transform::AixLpar.apply(ty, &[0.5, 2.0, 16.0, 1.0]).unwrap();
    assert!(row[4..] == [50.0, 3.125]);
    let row = Transform::AixLpar.apply(ty, &[0.5, 2.0, 0.0, 0.0]).unwrap();
    assert!(row[4..] == [0.0, 0.0]);

    let ds = make_type(
        "MEM",
        Transform::AixMemory,
        &["Real Free %", "Virtual free %", "Real free(MB)", "Virtual free(MB)", "Real total(MB)", "Virtual total(MB)"],
    );
    let ty = ds.get_type("MEM").unwrap();
    let row = Transform::AixMemory.apply(ty, &[25.0, 50.0, 1024.0, 2048.0, 4096.0, 4096.0]).unwrap();
    assert!(row[6..] == [3072.0, 2048.0]);

    let ds = make_type("PCPU_ALL", Transform::AixCpu, &["User", "Sys", "Wait", "Idle"]);
    let ty = ds.get_type("PCPU_ALL").unwrap();
    let row = Transform::AixCpu.apply(ty, &[0.5, 0.25, 0.0, 1.25]).unwrap();
    assert!(row[4..] == [2.0, 37.5]);
}
