//! Parser for `lsof -F` field output.
//!
//! Each line starts with a one-letter tag. Process records (`p`, `c`) are
//! followed by the file records (`f`, `n`) of that process, with no record
//! terminator, so the current process has to be carried from line to line.

/// One file held open by one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub pid: u32,
    pub command: String,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct FieldParser {
    pid: Option<u32>,
    command: Option<String>,
}

impl FieldParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one output line, yielding an observation for `n` lines seen
    /// inside an open process context.
    pub fn feed(&mut self, line: &str) -> Option<Observation> {
        let mut chars = line.chars();
        let tag = chars.next()?;
        let value = chars.as_str();

        match tag {
            'p' => {
                // A malformed pid closes the context so its files are ignored.
                self.pid = value.trim().parse().ok();
                self.command = None;
                None
            }
            'c' => {
                self.command = Some(value.trim().to_string());
                None
            }
            'n' => {
                let pid = self.pid?;
                Some(Observation {
                    pid,
                    command: self.command.clone().unwrap_or_default(),
                    name: value.to_string(),
                })
            }
            _ => None,
        }
    }
}

pub fn parse(output: &str) -> Vec<Observation> {
    let mut parser = FieldParser::new();
    output.lines().filter_map(|line| parser.feed(line)).collect()
}
