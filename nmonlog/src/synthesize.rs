/// Synthesize one aggregate process for every name that has more than one process identity.
///
/// The aggregate has pid AGGREGATE_PID and lives from the earliest start to the latest end of the
/// group.  Its type has the fields of the group's first identity (the TOP layout is the same for
/// all processes in a file) plus a `Count` field.  In every record where at least one member has
/// data, the aggregate row is the fieldwise sum of the members' rows, and Count is the number of
/// members present.

use crate::{Dataset, ProcessId, TypeKey, AGGREGATE_PID};

use std::time::Instant;
use tracing::debug;

pub(crate) fn aggregate_processes(dataset: &mut Dataset) {
    let groups = dataset
        .processes_by_name()
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(name, members)| (name.to_string(), members.iter().map(|p| p.id()).collect::<Vec<ProcessId>>()))
        .collect::<Vec<(String, Vec<ProcessId>)>>();

    for (name, members) in groups {
        aggregate_group(dataset, &name, &members);
    }
}

fn aggregate_group(dataset: &mut Dataset, name: &str, members: &[ProcessId]) {
    let started = Instant::now();

    let member_types = members
        .iter()
        .filter_map(|id| dataset.process_type(*id))
        .map(|ty| ty.key())
        .collect::<Vec<TypeKey>>();
    let start = members.iter().map(|id| dataset.process(*id).start_time()).min();
    let end = members.iter().map(|id| dataset.process(*id).end_time()).max();
    let (start, end) = match (start, end, member_types.first()) {
        (Some(start), Some(end), Some(_)) => (start, end),
        _ => return,
    };

    let mut fields = dataset.type_of(member_types[0]).fields().to_vec();
    fields.push("Count".to_string());
    let width = fields.len();

    let aggregate = dataset.add_process(AGGREGATE_PID, name, start, Some(format!("all {} processes", name)));
    dataset.process_mut(aggregate).set_end_time(end);
    let key = dataset.add_process_type(aggregate, fields);

    let (types, records) = dataset.types_and_records_mut();
    let aggregate_type = &types[key.index()];
    for record in records.iter_mut() {
        let mut totals = vec![0.0; width];
        let mut count = 0;
        for member in &member_types {
            if let Some(row) = record.get_data(&types[member.index()]) {
                count += 1;
                for (total, value) in totals[..width - 1].iter_mut().zip(row) {
                    *total += value;
                }
            }
        }
        if count > 0 {
            totals[width - 1] = count as f64;
            let added = record.add_data(aggregate_type, totals);
            debug_assert!(added.is_ok());
        }
    }

    debug!("aggregated process data for {} in {:?}", name, started.elapsed());
}

#[cfg(test)]
fn t(secs: i64) -> crate::Timestamp {
    use chrono::TimeZone;
    chrono::Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[test]
fn test_aggregate_sums_and_counts() {
    use crate::DataRecord;

    let fields = vec!["%CPU".to_string(), "Size".to_string()];
    let mut ds = Dataset::new("test");
    let a = ds.add_process(10, "httpd", t(0), None);
    let b = ds.add_process(11, "httpd", t(10), None);
    let c = ds.add_process(12, "sshd", t(0), None);
    ds.process_mut(a).set_end_time(t(10));
    ds.process_mut(b).set_end_time(t(20));
    let ka = ds.add_process_type(a, fields.clone());
    let kb = ds.add_process_type(b, fields.clone());
    let kc = ds.add_process_type(c, fields.clone());

    let rows: [&[(TypeKey, [f64; 2])]; 4] = [
        &[(ka, [1.0, 100.0]), (kc, [9.0, 9.0])],
        &[(ka, [2.0, 100.0]), (kb, [3.0, 50.0])],
        &[(kb, [4.0, 60.0])],
        &[(kc, [1.0, 1.0])],
    ];
    for (i, row) in rows.iter().enumerate() {
        let mut r = DataRecord::new(t(10 * i as i64), format!("T{:04}", i + 1));
        for (k, values) in row.iter() {
            r.add_data(ds.type_of(*k), values.to_vec()).unwrap();
        }
        ds.add_record(r);
    }

    aggregate_processes(&mut ds);

    // Only httpd has more than one identity
    let aggregates = ds.processes().iter().filter(|p| p.is_aggregate()).collect::<Vec<_>>();
    assert!(aggregates.len() == 1);
    let agg = aggregates[0];
    assert!(agg.name() == "httpd");
    assert!(agg.pid() == AGGREGATE_PID);
    assert!(agg.command_line() == Some("all httpd processes"));
    assert!(agg.start_time() == t(0));
    assert!(agg.end_time() == t(20));

    let ty = ds.process_type(agg.id()).unwrap();
    assert!(ty.fields() == ["%CPU", "Size", "Count"]);
    let recs = ds.records();
    assert!(recs[0].get_data(ty) == Some(&[1.0, 100.0, 1.0][..]));
    assert!(recs[1].get_data(ty) == Some(&[5.0, 150.0, 2.0][..]));
    assert!(recs[2].get_data(ty) == Some(&[4.0, 60.0, 1.0][..]));
    assert!(!recs[3].has_data(ty));

    // Aggregates are not grouped again
    assert!(ds.processes_by_name()["httpd"].len() == 2);
}
