// The header of an nmon file: everything before the first timestamp line.
//
// The header holds metadata (AAA), free-text system information (BBB*), the TOP column layout and
// the definitions of most of the data types.  The platform is decided, and the transforms for it
// installed, when the first ordinary type definition is seen, so the AAA lines must all precede
// it.  nmon writes them first.
//
// System information comes in two forms:
//
//   BBBP,001,/etc/release,"DISTRIB_ID=Ubuntu"      quoted, one line of text per line
//   BBBL,01,Node Name,web01                         continuation, the block id is the tag
//
// For the continuation form the first line of a block is its title and is not kept.

use crate::diagnostics::DiagnosticKind;
use crate::logfile::{Installed, ParseError, ParseRun};
use crate::records::{skip_columns, IGNORED_TYPES};
use crate::tokenizer::Tokenizer;
use crate::transforms::{Platform, TransformPipeline};
use crate::Dataset;

use std::collections::BTreeMap;
use std::io;
use tracing::debug;

impl ParseRun {
    /// Consume the header.  Returns the first timestamp line, or None if there is none.

    pub(crate) fn parse_headers<R: io::Read>(
        &mut self,
        tokens: &mut Tokenizer<R>,
    ) -> Result<Option<Vec<String>>, ParseError> {
        while let Some(values) = tokens.next_line()? {
            self.reporter.set_line(tokens.line());
            if values.first().map(|tag| tag == "ZZZZ").unwrap_or(false) {
                return Ok(Some(values));
            }
            self.header_line(&values);
        }
        Ok(None)
    }

    fn header_line(&mut self, values: &[String]) {
        let tag = match values.first() {
            Some(tag) if !tag.is_empty() => tag.as_str(),
            _ => return,
        };
        match tag {
            "AAA" => self.metadata_line(values),
            "TOP" => {
                // There is also a bogus "TOP,%CPU Utilisation" line
                if values.get(1).map(|v| v == "+PID").unwrap_or(false) {
                    self.top_schema(values);
                }
            }
            // AIX declares UARG in the header
            "UARG" => {}
            _ if tag.starts_with("BBB") => self.system_info.line(values),
            _ => self.define_type(values),
        }
    }

    /// Record an AAA line.

    pub(crate) fn metadata_line(&mut self, values: &[String]) {
        if values.len() < 2 || values[1].starts_with("note") {
            return;
        }
        // Linux writes AAA,OS,Linux,<kernel>,<build>,<arch>
        if values[1] == "OS" && values.len() >= 6 {
            self.dataset.set_metadata("OS", &format!("{} {}", values[2], values[3]));
            self.dataset.set_metadata("ARCH", &values[5]);
        } else {
            self.dataset.set_metadata(&values[1], &values[2..].join(","));
        }
    }

    fn top_schema(&mut self, values: &[String]) {
        let platform = self.platform();
        self.tracker.set_schema(values, platform, &mut self.reporter);
    }

    /// The platform in effect: the installed one, or the one the metadata point to so far.

    pub(crate) fn platform(&self) -> Platform {
        match self.installed {
            Some(ref installed) => installed.platform,
            None => detect_platform(&self.dataset),
        }
    }

    pub(crate) fn declared_cpus(&self) -> u32 {
        self.installed.as_ref().map(|i| i.cpus).unwrap_or(1)
    }

    // Fix the platform, the transforms and the declared CPU count.  This happens once.
    fn install_platform(&mut self) {
        if self.installed.is_some() {
            return;
        }
        let platform = detect_platform(&self.dataset);
        let cpus = self
            .dataset
            .metadata("cpus")
            .and_then(|c| c.trim().parse::<u32>().ok())
            .filter(|c| *c > 0)
            .unwrap_or(1);
        debug!("{:?} platform with {} CPUs", platform, cpus);
        self.installed = Some(Installed {
            platform,
            pipeline: TransformPipeline::for_platform(platform),
            cpus,
        });
    }

    /// Define a data type from a definition line, unless it is ignorable, malformed or already
    /// defined.

    pub(crate) fn define_type(&mut self, values: &[String]) {
        self.install_platform();

        let id = values[0].as_str();
        if values.len() < 3 {
            // Disk groups are often declared empty
            if !id.starts_with("DG") {
                self.reporter.report(None, DiagnosticKind::InvalidTypeDefinition { type_id: id.to_string() });
            }
            return;
        }
        if IGNORED_TYPES.contains(&id) || self.dataset.get_type(id).is_some() {
            return;
        }

        let name = strip_hostname(&values[1], self.dataset.hostname());
        let skip = skip_columns(id);
        let fields = values
            .iter()
            .enumerate()
            .skip(2)
            .filter(|(ix, _)| !skip.contains(ix))
            .map(|(_, f)| f.clone())
            .collect::<Vec<String>>();

        let transform = self.installed.as_ref().and_then(|i| i.pipeline.find(id));
        let fields = match transform {
            Some(t) => t.build_fields(fields),
            None => fields,
        };
        let key = self.dataset.add_type(id.to_string(), name, fields);
        if let Some(t) = transform {
            self.type_transforms.insert(key, t);
        }
    }
}

fn detect_platform(dataset: &Dataset) -> Platform {
    if dataset.metadata("AIX").is_some() {
        Platform::Aix
    } else {
        Platform::Linux
    }
}

// "CPU Total web01" -> "CPU Total" when the host is web01.  The host must follow a space.
fn strip_hostname(name: &str, hostname: &str) -> String {
    if !hostname.is_empty() {
        if let Some(ix) = name.find(&format!(" {}", hostname)) {
            return name[..ix].trim_end().to_string();
        }
    }
    name.to_string()
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

/// System information blocks, collected over the whole file and published into the Dataset at the
/// end.

#[derive(Debug, Default)]
pub(crate) struct SystemInfo {
    blocks: BTreeMap<String, String>,
}

impl SystemInfo {
    pub(crate) fn line(&mut self, values: &[String]) {
        if values[0] == "BBBP" {
            self.quoted_line(values);
        } else {
            self.continuation_line(values);
        }
    }

    // Lines without text (BBBP,000,/etc/release) only announce the block.
    fn quoted_line(&mut self, values: &[String]) {
        if values.len() != 4 {
            return;
        }
        let text = strip_quotes(&values[3]);
        match self.blocks.get_mut(&values[2]) {
            Some(block) => {
                block.push('\n');
                block.push_str(text);
            }
            None => {
                self.blocks.insert(values[2].clone(), text.to_string());
            }
        }
    }

    fn continuation_line(&mut self, values: &[String]) {
        match self.blocks.get_mut(&values[0]) {
            Some(block) => {
                if values.len() > 2 {
                    block.push_str(&values[2..].join(","));
                }
                block.push('\n');
            }
            None => {
                self.blocks.insert(values[0].clone(), String::new());
            }
        }
    }

    pub(crate) fn publish(self, dataset: &mut Dataset) {
        for (id, text) in self.blocks {
            dataset.set_system_info(id, text);
        }
    }
}

#[cfg(test)]
fn split(line: &str) -> Vec<String> {
    line.split(',').map(|f| f.to_string()).collect()
}

#[test]
fn test_strip_hostname() {
    assert!(strip_hostname("CPU Total web01", "web01") == "CPU Total");
    assert!(strip_hostname("Memory MB web01.example.com", "web01") == "Memory MB");
    assert!(strip_hostname("CPU Total", "web01") == "CPU Total");
    assert!(strip_hostname("web01", "web01") == "web01");
    assert!(strip_hostname("CPU Total", "") == "CPU Total");
    assert!(strip_hostname("CPU Total al", "al") == "CPU Total");
    assert!(strip_hostname("Disk %Busy valhalla", "al") == "Disk %Busy valhalla");
    assert!(strip_hostname("Network I/O dalby al", "al") == "Network I/O dalby");
}

#[test]
fn test_system_info() {
    let mut info = SystemInfo::default();
    for line in [
        "BBBP,000,/etc/release",
        "BBBP,001,/etc/release,\"DISTRIB_ID=Ubuntu\"",
        "BBBP,002,/etc/release,\"DISTRIB_RELEASE=22.04\"",
        "BBBL,00,lparstat -i",
        "BBBL,01,Node Name,web01",
        "BBBL,02,Partition Number,3",
    ] {
        info.line(&split(line));
    }
    let mut ds = Dataset::new("test");
    info.publish(&mut ds);
    assert!(ds.system_info("/etc/release") == Some("DISTRIB_ID=Ubuntu\nDISTRIB_RELEASE=22.04"));
    assert!(ds.system_info("BBBL") == Some("Node Name,web01\nPartition Number,3\n"));
    assert!(ds.system_info_entries().count() == 2);
}

#[test]
fn test_metadata_lines() {
    let mut run = ParseRun::new("test", chrono_tz::Tz::UTC);
    run.metadata_line(&split("AAA,OS,Linux,5.15.0-91-generic,#101-Ubuntu SMP,x86_64"));
    run.metadata_line(&split("AAA,note0,Warning - use the UNIX sort command"));
    run.metadata_line(&split("AAA,MachineType,IBM,9117-MMA"));
    run.metadata_line(&split("AAA,OS,AIX"));
    run.metadata_line(&split("AAA"));
    let ds = &run.dataset;
    assert!(ds.metadata("ARCH") == Some("x86_64"));
    assert!(ds.metadata("OS") == Some("AIX"));
    assert!(ds.metadata("MachineType") == Some("IBM,9117-MMA"));
    assert!(ds.metadata("note0").is_none());
}

#[test]
fn test_define_type() {
    let mut run = ParseRun::new("test", chrono_tz::Tz::UTC);
    run.metadata_line(&split("AAA,host,lpar7"));
    run.metadata_line(&split("AAA,AIX,7.2.0.0"));
    run.metadata_line(&split("AAA,cpus,8"));
    run.define_type(&split("CPU_ALL,CPU Total lpar7,User%,Sys%,Wait%,Idle%,Busy,PhysicalCPUs"));

    // Installed once; later metadata does not matter
    run.metadata_line(&split("AAA,cpus,2"));
    assert!(run.platform() == Platform::Aix);
    assert!(run.declared_cpus() == 8);

    run.define_type(&split("RAWLPAR,RAW LPAR,a,b,c,d"));
    run.define_type(&split("DGBUSY,Disk Group Busy"));
    run.define_type(&split("NOFIELDS,No fields"));
    run.define_type(&split("AVM-IN-MB,AVM,x"));
    run.define_type(&split("CPU_ALL,Again,x"));

    let ds = &run.dataset;
    let cpu = ds.get_type("CPU_ALL").unwrap();
    assert!(cpu.name() == "CPU Total");
    assert!(cpu.fields().last().unwrap() == "CPU%");
    assert!(cpu.field_count() == 7);
    assert!(ds.get_type("RAWLPAR").unwrap().fields() == ["c", "d"]);
    assert!(ds.get_type("DGBUSY").is_none());
    assert!(ds.get_type("AVM-IN-MB").is_none());

    let diags = run.reporter.into_diagnostics();
    assert!(diags.len() == 1);
    assert!(diags[0].kind == DiagnosticKind::InvalidTypeDefinition { type_id: "NOFIELDS".to_string() });
}
