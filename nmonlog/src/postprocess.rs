// Cross-type totals computed for each record as it is sealed.
//
// nmon splits the interfaces of a host across numbered continuation types when there are many of
// them (NET, NET1, NET2, ...).  A post-processor sums the per-interface columns of all the types
// of such a family into one synthetic total row, attached under a synthesized type that is
// registered the first time it is needed.

use crate::{DataRecord, Dataset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessor {
    /// Throughput (KB/s) across the family `<prefix>`, `<prefix>1`, ...
    NetworkTotal(&'static str),

    /// Packet rates across the family `<prefix>PACKET`, `<prefix>PACKET1`, ...
    EthernetTotal(&'static str),
}

impl PostProcessor {
    /// The post-processors that apply to every file, in the order they run.

    pub fn default_set() -> Vec<PostProcessor> {
        vec![
            PostProcessor::NetworkTotal("NET"),
            PostProcessor::NetworkTotal("SEA"),
            PostProcessor::EthernetTotal("NET"),
            PostProcessor::EthernetTotal("SEA"),
        ]
    }

    fn family(self) -> String {
        match self {
            PostProcessor::NetworkTotal(prefix) => prefix.to_string(),
            PostProcessor::EthernetTotal(prefix) => format!("{}PACKET", prefix),
        }
    }

    pub fn output_id(self) -> String {
        format!("{}_TOTAL", self.family())
    }

    pub fn output_name(self) -> String {
        match self {
            PostProcessor::NetworkTotal(prefix) => format!("{} Total", prefix),
            PostProcessor::EthernetTotal(prefix) => format!("{} Packet Total", prefix),
        }
    }

    fn output_fields(self) -> [&'static str; 3] {
        match self {
            PostProcessor::NetworkTotal(_) => ["read-KB/s", "write-KB/s", "total-KB/s"],
            PostProcessor::EthernetTotal(_) => ["read/s", "write/s", "total/s"],
        }
    }

    // The type ids of the family: the family name optionally followed by digits.
    fn is_member(self, type_id: &str) -> bool {
        match type_id.strip_prefix(&self.family()) {
            Some(rest) => rest.chars().all(|c| c.is_ascii_digit()),
            None => false,
        }
    }

    // 0 for a per-interface read column, 1 for write, None for anything else.
    fn direction(self, field: &str) -> Option<usize> {
        if field.starts_with("lo-") {
            return None;
        }
        let (read, write) = match self {
            PostProcessor::NetworkTotal(_) => ("-read-KB/s", "-write-KB/s"),
            PostProcessor::EthernetTotal(_) => ("-read/s", "-write/s"),
        };
        if field.ends_with(read) {
            Some(0)
        } else if field.ends_with(write) {
            Some(1)
        } else {
            None
        }
    }

    /// Attach the family total to `record`, if any member of the family has data in it.

    pub fn post_process(self, dataset: &mut Dataset, record: &mut DataRecord) {
        let mut totals = [0.0, 0.0];
        let mut seen = false;
        for ty in dataset.ordinary_types().filter(|ty| self.is_member(ty.id())) {
            if let Some(row) = record.get_data(ty) {
                seen = true;
                for (field, value) in ty.fields().iter().zip(row) {
                    if let Some(dir) = self.direction(field) {
                        totals[dir] += value;
                    }
                }
            }
        }
        if !seen {
            return;
        }

        let id = self.output_id();
        let key = match dataset.get_type(&id) {
            Some(ty) => ty.key(),
            None => dataset.add_type(
                id,
                self.output_name(),
                self.output_fields().iter().map(|f| f.to_string()).collect(),
            ),
        };
        let added = record.add_data(
            dataset.type_of(key),
            vec![totals[0], totals[1], totals[0] + totals[1]],
        );
        debug_assert!(added.is_ok());
    }
}

#[cfg(test)]
fn make_record() -> DataRecord {
    use chrono::TimeZone;
    DataRecord::new(chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap(), "T0001".to_string())
}

#[cfg(test)]
fn strings(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|x| x.to_string()).collect()
}

#[test]
fn test_network_total() {
    let mut ds = Dataset::new("test");
    let net = ds.add_type("NET".to_string(), "Network I/O".to_string(), strings(&["lo-read-KB/s", "eth0-read-KB/s", "lo-write-KB/s", "eth0-write-KB/s"]));
    let net1 = ds.add_type("NET1".to_string(), "Network I/O".to_string(), strings(&["eth1-read-KB/s", "eth1-write-KB/s"]));
    let netpacket = ds.add_type("NETPACKET".to_string(), "Network Packets".to_string(), strings(&["eth0-read/s", "eth0-write/s"]));

    let mut r = make_record();
    r.add_data(ds.type_of(net), vec![1.0, 10.0, 1.0, 20.0]).unwrap();
    r.add_data(ds.type_of(net1), vec![3.0, 4.0]).unwrap();
    r.add_data(ds.type_of(netpacket), vec![100.0, 200.0]).unwrap();

    PostProcessor::NetworkTotal("NET").post_process(&mut ds, &mut r);
    let total = ds.get_type("NET_TOTAL").unwrap();
    assert!(total.name() == "NET Total");
    assert!(r.get_data(total) == Some(&[13.0, 24.0, 37.0][..]));

    // NETPACKET is not in the NET family, and NET_TOTAL is not either
    assert!(!PostProcessor::NetworkTotal("NET").is_member("NETPACKET"));
    assert!(!PostProcessor::NetworkTotal("NET").is_member("NET_TOTAL"));

    PostProcessor::EthernetTotal("NET").post_process(&mut ds, &mut r);
    let packets = ds.get_type("NETPACKET_TOTAL").unwrap();
    assert!(r.get(packets, "total/s") == Some(300.0));
}

#[test]
fn test_no_family_data() {
    let mut ds = Dataset::new("test");
    ds.add_type("SEA".to_string(), "Shared Ethernet".to_string(), strings(&["ent5-read-KB/s", "ent5-write-KB/s"]));
    let mut r = make_record();
    PostProcessor::NetworkTotal("SEA").post_process(&mut ds, &mut r);

    // Nothing attached and nothing registered
    assert!(ds.get_type("SEA_TOTAL").is_none());
    assert!(r.type_keys().count() == 0);
}
