// Split an nmon file into lines of fields.
//
// The format is comma-separated but it is not CSV: quote characters carry no meaning to the
// delimiter (a quoted system-information value containing a comma is two fields), so quoting is
// turned off in the reader and the quotes are left for the consumer to deal with.
//
// Writers commonly end lines with a trailing comma, and the field counts elsewhere in the parser
// assume those trailing empty fields are not present, so they are removed here.  Empty fields in
// the interior of a line are significant and are kept.
//
// Input that is not UTF-8 (it happens in command lines) is decoded lossily.

use std::io;

pub struct Tokenizer<R: io::Read> {
    reader: csv::Reader<R>,
    record: csv::ByteRecord,
    line: u64,
}

impl<R: io::Read> Tokenizer<R> {
    pub fn new(input: R) -> Tokenizer<R> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(input);
        Tokenizer {
            reader,
            record: csv::ByteRecord::new(),
            line: 0,
        }
    }

    /// Return the fields of the next nonblank line, or None at end of input.  An error here is an
    /// I/O error.

    pub fn next_line(&mut self) -> Result<Option<Vec<String>>, csv::Error> {
        if !self.reader.read_byte_record(&mut self.record)? {
            return Ok(None);
        }
        self.line = match self.record.position() {
            Some(pos) => pos.line(),
            None => self.line + 1,
        };
        let mut fields = self
            .record
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect::<Vec<String>>();
        while matches!(fields.last(), Some(f) if f.is_empty()) {
            fields.pop();
        }
        Ok(Some(fields))
    }

    /// The 1-based line number of the line most recently returned by `next_line`.

    pub fn line(&self) -> u64 {
        self.line
    }
}

#[test]
fn test_tokenizer() {
    let input = "AAA,host,web01\n\nCPU_ALL,T0001,1.0,,2.0,,\nBBBP,001,/etc/release,\"a,b\"\n";
    let mut tokens = Tokenizer::new(input.as_bytes());

    assert!(tokens.next_line().unwrap() == Some(vec!["AAA".to_string(), "host".to_string(), "web01".to_string()]));
    assert!(tokens.line() == 1);

    // The blank line is skipped, the trailing empty fields are dropped, the interior one is not
    let fields = tokens.next_line().unwrap().unwrap();
    assert!(tokens.line() == 3);
    assert!(fields == vec!["CPU_ALL", "T0001", "1.0", "", "2.0"]);

    // Quotes are not special
    let fields = tokens.next_line().unwrap().unwrap();
    assert!(tokens.line() == 4);
    assert!(fields == vec!["BBBP", "001", "/etc/release", "\"a", "b\""]);

    assert!(tokens.next_line().unwrap().is_none());
}

#[test]
fn test_tokenizer_lossy() {
    let input: &[u8] = b"UARG,T0001,1,0,caf\xe9\r\nZZZZ,T0002\r\n";
    let mut tokens = Tokenizer::new(input);
    let fields = tokens.next_line().unwrap().unwrap();
    assert!(fields[4] == "caf\u{FFFD}");
    let fields = tokens.next_line().unwrap().unwrap();
    assert!(fields == vec!["ZZZZ", "T0002"]);
    assert!(tokens.line() == 2);
}
