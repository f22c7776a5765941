use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracestitch_engine::{Error, Result, Sink};
use tracestitch_types::{TaskKind, ThreadState, TimedEvent};

/// One line of the `jsonl` output
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputRecord<'a> {
    Task {
        kind: TaskKind,
        begin: &'a TimedEvent,
        end: &'a TimedEvent,
    },
    Relation {
        link: &'a TimedEvent,
        start: &'a TimedEvent,
        finish: &'a TimedEvent,
    },
    Metadata {
        record: &'a TimedEvent,
    },
    ContextSwitch {
        time: f64,
        cpu: u32,
        prev: &'a ThreadState,
        next: &'a ThreadState,
    },
}

pub struct JsonlSink {
    out: BufWriter<File>,
}

impl JsonlSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
        })
    }

    fn write(&mut self, record: &OutputRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, record).map_err(Error::sink)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

impl Sink for JsonlSink {
    fn complete_task(&mut self, kind: TaskKind, begin: &TimedEvent, end: &TimedEvent) -> Result<()> {
        self.write(&OutputRecord::Task { kind, begin, end })
    }

    fn relation(&mut self, link: &TimedEvent, start: &TimedEvent, finish: &TimedEvent) -> Result<()> {
        self.write(&OutputRecord::Relation {
            link,
            start,
            finish,
        })
    }

    fn global_metadata(&mut self, record: &TimedEvent) -> Result<()> {
        self.write(&OutputRecord::Metadata { record })
    }

    fn context_switch(
        &mut self,
        time: f64,
        cpu: u32,
        prev: &ThreadState,
        next: &ThreadState,
    ) -> Result<()> {
        self.write(&OutputRecord::ContextSwitch {
            time,
            cpu,
            prev,
            next,
        })
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
