/// The parsed form of one nmon file.
///
/// A Dataset owns three arenas - data types, processes, and records - and hands out small copyable
/// keys (`TypeKey`, `ProcessId`) into the first two.  Ordinary types are also indexed by their type
/// id.  Process types are indexed by their process only: every process identity gets a type of its
/// own, all with the type id "TOP".
///
/// A process id as written by nmon (the pid) is not an identity: pids are reused by the OS, and
/// the same pid may map to several processes over the lifetime of a file.

use crate::{Diagnostic, Timestamp};

use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};

/// The pid of the synthesized per-name aggregate processes.

pub const AGGREGATE_PID: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(usize);

impl TypeKey {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(usize);

/// A measurement schema: a type id, a display name, and an ordered list of field names.  The field
/// list never changes once the type is created.

#[derive(Debug)]
pub struct DataType {
    key: TypeKey,
    id: String,
    name: String,
    fields: Vec<String>,
    process: Option<ProcessId>,
}

impl DataType {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.field_index(field).is_some()
    }

    /// For the type of a process identity, the process.

    pub fn process(&self) -> Option<ProcessId> {
        self.process
    }
}

/// A bounded-lifetime process identity.

#[derive(Debug, Clone)]
pub struct Process {
    id: ProcessId,
    pid: i32,
    name: String,
    command_line: Option<String>,
    start_time: Timestamp,
    end_time: Timestamp,
}

impl Process {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// The OS process id, or AGGREGATE_PID.

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command_line(&self) -> Option<&str> {
        self.command_line.as_deref()
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// The time of the last record the process was seen in, or the time the identity was
    /// superseded.

    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    pub fn is_aggregate(&self) -> bool {
        self.pid == AGGREGATE_PID
    }

    pub(crate) fn set_command_line(&mut self, command_line: String) {
        self.command_line = Some(command_line);
    }

    pub(crate) fn set_end_time(&mut self, t: Timestamp) {
        self.end_time = t;
    }
}

/// The data for one timestamp tick: for each type that has data at this time, one row of values,
/// with exactly as many values as the type has fields.

#[derive(Debug)]
pub struct DataRecord {
    time: Timestamp,
    timestamp: String,
    data: BTreeMap<TypeKey, Vec<f64>>,
}

impl DataRecord {
    pub(crate) fn new(time: Timestamp, timestamp: String) -> DataRecord {
        DataRecord {
            time,
            timestamp,
            data: BTreeMap::new(),
        }
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    /// The timestamp token, eg "T0001".

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn get_data(&self, ty: &DataType) -> Option<&[f64]> {
        self.data.get(&ty.key).map(|row| row.as_slice())
    }

    pub fn has_data(&self, ty: &DataType) -> bool {
        self.data.contains_key(&ty.key)
    }

    /// The value of the named field of `ty` at this time, if there is data for the type.

    pub fn get(&self, ty: &DataType, field: &str) -> Option<f64> {
        let ix = ty.field_index(field)?;
        self.get_data(ty).map(|row| row[ix])
    }

    pub fn has(&self, ty: &DataType, field: &str) -> bool {
        self.get(ty, field).is_some()
    }

    /// The keys of the types that have data in this record.

    pub fn type_keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.data.keys().copied()
    }

    /// Attach a row for `ty`, replacing any row already there.  A row whose length is not the
    /// type's field count is handed back.

    pub(crate) fn add_data(&mut self, ty: &DataType, row: Vec<f64>) -> Result<(), Vec<f64>> {
        if row.len() != ty.field_count() {
            return Err(row);
        }
        self.data.insert(ty.key, row);
        Ok(())
    }

    pub(crate) fn remove_data(&mut self, ty: &DataType) -> Option<Vec<f64>> {
        self.data.remove(&ty.key)
    }
}

#[derive(Debug)]
pub struct Dataset {
    source: String,
    metadata: BTreeMap<String, String>,
    system_info: BTreeMap<String, String>,
    types: Vec<DataType>,
    type_ids: BTreeMap<String, TypeKey>,
    process_types: HashMap<ProcessId, TypeKey>,
    processes: Vec<Process>,
    records: Vec<DataRecord>,
    diagnostics: Vec<Diagnostic>,
}

impl Dataset {
    pub(crate) fn new(source: &str) -> Dataset {
        Dataset {
            source: source.to_string(),
            metadata: BTreeMap::new(),
            system_info: BTreeMap::new(),
            types: vec![],
            type_ids: BTreeMap::new(),
            process_types: HashMap::new(),
            processes: vec![],
            records: vec![],
            diagnostics: vec![],
        }
    }

    /// The name of the file the data came from.

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The `host` metadata value, or "" if there is none.

    pub fn hostname(&self) -> &str {
        self.metadata("host").unwrap_or("")
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|v| v.as_str())
    }

    pub fn metadata_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn system_info(&self, key: &str) -> Option<&str> {
        self.system_info.get(key).map(|v| v.as_str())
    }

    pub fn system_info_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.system_info.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Look up an ordinary (non-process) type by type id.

    pub fn get_type(&self, id: &str) -> Option<&DataType> {
        self.type_ids.get(id).map(|k| &self.types[k.0])
    }

    pub fn type_of(&self, key: TypeKey) -> &DataType {
        &self.types[key.0]
    }

    /// The type holding the data of a process identity.

    pub fn process_type(&self, process: ProcessId) -> Option<&DataType> {
        self.process_types.get(&process).map(|k| &self.types[k.0])
    }

    /// All types, ordinary and process, in creation order.

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    /// The ordinary types, ordered by type id.

    pub fn ordinary_types(&self) -> impl Iterator<Item = &DataType> {
        self.type_ids.values().map(|k| &self.types[k.0])
    }

    /// The records in input order, which is ascending time order for well-formed input.

    pub fn records(&self) -> &[DataRecord] {
        &self.records
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn process(&self, id: ProcessId) -> &Process {
        &self.processes[id.0]
    }

    /// The non-aggregate processes grouped by name, each group in creation order.

    pub fn processes_by_name(&self) -> BTreeMap<&str, Vec<&Process>> {
        self.processes
            .iter()
            .filter(|p| !p.is_aggregate())
            .map(|p| (p.name(), p))
            .into_group_map()
            .into_iter()
            .collect()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn start_time(&self) -> Option<Timestamp> {
        self.records.first().map(|r| r.time)
    }

    pub fn end_time(&self) -> Option<Timestamp> {
        self.records.last().map(|r| r.time)
    }

    pub(crate) fn set_metadata(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    pub(crate) fn set_system_info(&mut self, key: String, value: String) {
        self.system_info.insert(key, value);
    }

    /// Create an ordinary type.  A type with the same id must not exist already.

    pub(crate) fn add_type(&mut self, id: String, name: String, fields: Vec<String>) -> TypeKey {
        let key = TypeKey(self.types.len());
        self.type_ids.insert(id.clone(), key);
        self.types.push(DataType {
            key,
            id,
            name,
            fields,
            process: None,
        });
        key
    }

    pub(crate) fn add_process(
        &mut self,
        pid: i32,
        name: &str,
        start_time: Timestamp,
        command_line: Option<String>,
    ) -> ProcessId {
        let id = ProcessId(self.processes.len());
        self.processes.push(Process {
            id,
            pid,
            name: name.to_string(),
            command_line,
            start_time,
            end_time: start_time,
        });
        id
    }

    pub(crate) fn process_mut(&mut self, id: ProcessId) -> &mut Process {
        &mut self.processes[id.0]
    }

    pub(crate) fn add_process_type(&mut self, process: ProcessId, fields: Vec<String>) -> TypeKey {
        let key = TypeKey(self.types.len());
        let name = self.processes[process.0].name.clone();
        self.process_types.insert(process, key);
        self.types.push(DataType {
            key,
            id: "TOP".to_string(),
            name,
            fields,
            process: Some(process),
        });
        key
    }

    pub(crate) fn add_record(&mut self, record: DataRecord) {
        self.records.push(record);
    }

    /// Put the records in time order.  Records with equal times keep their file order.

    pub(crate) fn sort_records(&mut self) {
        self.records.sort_by_key(|r| r.time);
    }

    /// Split borrow for passes that read types while adding rows to sealed records.

    pub(crate) fn types_and_records_mut(&mut self) -> (&[DataType], &mut [DataRecord]) {
        (&self.types, &mut self.records)
    }

    pub(crate) fn set_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics = diagnostics;
    }
}

#[cfg(test)]
fn t(secs: i64) -> Timestamp {
    use chrono::TimeZone;
    chrono::Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[test]
fn test_record_rows() {
    let mut ds = Dataset::new("test");
    let k = ds.add_type("CPU_ALL".to_string(), "CPU Total".to_string(), vec!["User%".to_string(), "Sys%".to_string()]);
    let ty = ds.type_of(k);
    let mut r = DataRecord::new(t(0), "T0001".to_string());

    assert!(!r.has_data(ty));
    assert!(r.add_data(ty, vec![1.0]) == Err(vec![1.0]));
    assert!(r.add_data(ty, vec![1.0, 2.0, 3.0]).is_err());
    assert!(!r.has_data(ty));

    assert!(r.add_data(ty, vec![1.0, 2.0]).is_ok());
    assert!(r.get(ty, "Sys%") == Some(2.0));
    assert!(r.has(ty, "User%"));
    assert!(!r.has(ty, "Idle%"));
    assert!(r.get_data(ty) == Some(&[1.0, 2.0][..]));
    assert!(r.type_keys().collect::<Vec<_>>() == vec![k]);

    assert!(r.remove_data(ty) == Some(vec![1.0, 2.0]));
    assert!(!r.has_data(ty));
}

#[test]
fn test_dataset_registry() {
    let mut ds = Dataset::new("test");
    ds.set_metadata("host", "web01");
    assert!(ds.hostname() == "web01");

    let k = ds.add_type("MEM".to_string(), "Memory".to_string(), vec!["memtotal".to_string()]);
    assert!(ds.get_type("MEM").map(|t| t.key()) == Some(k));
    assert!(ds.get_type("TOP").is_none());

    let p1 = ds.add_process(42, "java", t(0), None);
    let p2 = ds.add_process(42, "java", t(5), Some("java -jar x".to_string()));
    let p3 = ds.add_process(7, "bash", t(0), None);
    let a = ds.add_process(AGGREGATE_PID, "java", t(0), None);
    let k1 = ds.add_process_type(p1, vec!["%CPU".to_string()]);

    assert!(ds.process_type(p1).map(|t| t.key()) == Some(k1));
    assert!(ds.process_type(p1).unwrap().id() == "TOP");
    assert!(ds.process_type(p1).unwrap().process() == Some(p1));
    assert!(ds.process_type(p2).is_none());
    assert!(ds.process(a).is_aggregate());
    assert!(ds.process(p2).command_line() == Some("java -jar x"));

    // Process types are not visible by type id
    assert!(ds.ordinary_types().count() == 1);

    let by_name = ds.processes_by_name();
    assert!(by_name.len() == 2);
    assert!(by_name["java"].iter().map(|p| p.id()).collect::<Vec<_>>() == vec![p1, p2]);
    assert!(by_name["bash"][0].id() == p3);
}
