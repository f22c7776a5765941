use std::fs::File;
use std::io;
use std::path::Path;

use tracestitch_engine::{Error, Result, Sink};
use tracestitch_types::{TaskKind, TimedEvent};

const HEADER: [&str; 12] = [
    "kind", "domain", "pid", "tid", "name", "begin", "end", "duration", "id", "parent", "args",
    "repaired",
];

/// Completed records as a flat table; relations and metadata are left out
pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        let mut writer = csv::Writer::from_path(path).map_err(io::Error::other)?;
        writer.write_record(HEADER).map_err(io::Error::other)?;
        Ok(Self { writer })
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl Sink for CsvSink {
    fn complete_task(&mut self, kind: TaskKind, begin: &TimedEvent, end: &TimedEvent) -> Result<()> {
        let event = &begin.event;
        let args = if event.args.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&event.args).map_err(Error::sink)?
        };

        self.writer
            .write_record([
                kind.as_str().to_string(),
                event.domain.clone(),
                event.process_id.to_string(),
                event.thread_id.to_string(),
                event.display_name(),
                begin.time.to_string(),
                end.time.to_string(),
                (end.time - begin.time).to_string(),
                optional(event.id),
                optional(event.parent_id),
                args,
                (begin.synthetic || end.synthetic).to_string(),
            ])
            .map_err(Error::sink)
    }

    fn relation(&mut self, _link: &TimedEvent, _start: &TimedEvent, _finish: &TimedEvent) -> Result<()> {
        Ok(())
    }

    fn global_metadata(&mut self, _record: &TimedEvent) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracestitch_types::{CanonicalEvent, EventKind};

    #[test]
    fn test_rows_follow_the_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let begin = TimedEvent::new(
            CanonicalEvent::new("gpu", EventKind::TaskBegin, 4)
                .with_thread(3, 9)
                .with_name("blit")
                .with_arg("bytes", 64),
            4.0,
        );
        let end = TimedEvent::synthetic(CanonicalEvent::new("gpu", EventKind::TaskEnd, 7), 7.5);

        let mut sink = CsvSink::create(&path).unwrap();
        sink.complete_task(TaskKind::Task, &begin, &end).unwrap();
        sink.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "kind,domain,pid,tid,name,begin,end,duration,id,parent,args,repaired"
        );
        assert_eq!(lines[1], "task,gpu,3,9,blit,4,7.5,3.5,,,\"{\"\"bytes\"\":64}\",true");
    }
}
