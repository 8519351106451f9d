//! Runs the wrapped program against decoded arguments with its standard
//! streams redirected into a capture buffer.
//!
//! Every execution gets its own `IoContext`, so concurrent submissions do
//! not share streams and need no lock.

use std::any::Any;
use std::fmt;
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::decode::DecodedArguments;
use crate::error::ProgramError;
use crate::value::OutputSink;

const COMPRESSION_SUFFIXES: &[(&str, &str)] = &[
    (".gz", "gzip"),
    (".bz2", "bzip2"),
    (".xz", "xz"),
    (".br", "br"),
    (".Z", "compress"),
];

/// The standard streams a program sees for one call: empty stdin, and
/// stdout and stderr into one buffer.
pub struct IoContext {
    pub stdin: Box<dyn Read + Send>,
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
    deadline: Option<Instant>,
}

impl IoContext {
    pub fn captured(buffer: &CaptureBuffer) -> Self {
        Self {
            stdin: Box::new(io::empty()),
            stdout: Box::new(buffer.clone()),
            stderr: Box::new(buffer.clone()),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// When the call should give up. External commands are killed here.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl fmt::Debug for IoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoContext")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Shared in-memory buffer; every clone appends to the same bytes.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// How a program asked to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    Success,
    Code(i32),
    /// Exit with a message, reported as code 1.
    Message(String),
}

impl Exit {
    pub fn code(&self) -> i32 {
        match self {
            Exit::Success => 0,
            Exit::Code(code) => *code,
            Exit::Message(_) => 1,
        }
    }
}

/// A wrapped program.
pub trait Program: Send + Sync {
    fn run(&self, args: &DecodedArguments, io: &mut IoContext) -> Result<Exit, ProgramError>;
}

impl<F> Program for F
where
    F: Fn(&DecodedArguments, &mut IoContext) -> Result<Exit, ProgramError> + Send + Sync,
{
    fn run(&self, args: &DecodedArguments, io: &mut IoContext) -> Result<Exit, ProgramError> {
        self(args, io)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    pub name: String,
    pub content: Vec<u8>,
    pub content_type: String,
    pub encoding: Option<&'static str>,
}

impl OutputFile {
    fn from_sink(sink: &OutputSink) -> Self {
        let (content_type, encoding) = guess_content_type(sink.name());
        Self {
            name: sink.name().to_string(),
            content: sink.contents(),
            content_type,
            encoding,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { exit_code: i32, output: String },
    OutputFile(OutputFile),
    /// The program failed or panicked.
    Faulted(String),
}

/// Content type from the file extension after stripping a compression
/// suffix, which is reported as the content encoding instead.
pub fn guess_content_type(name: &str) -> (String, Option<&'static str>) {
    let (stem, encoding) = COMPRESSION_SUFFIXES
        .iter()
        .find(|(suffix, _)| name.len() > suffix.len() && name.ends_with(suffix))
        .map(|(suffix, encoding)| (&name[..name.len() - suffix.len()], Some(*encoding)))
        .unwrap_or((name, None));
    let mime = mime_guess::from_path(stem).first_or_octet_stream();
    (mime.essence_str().to_string(), encoding)
}

/// Run `program` with captured streams. `timeout` becomes the call's
/// deadline, counted from here.
pub fn execute(
    program: &dyn Program,
    args: &DecodedArguments,
    timeout: Option<Duration>,
) -> Outcome {
    let capture = CaptureBuffer::new();
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let mut io = IoContext::captured(&capture).with_deadline(deadline);
    let result = panic::catch_unwind(AssertUnwindSafe(|| program.run(args, &mut io)));

    let exit = match result {
        Ok(Ok(exit)) => exit,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "program failed");
            return Outcome::Faulted(fault_report(&capture, &err.to_string()));
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            tracing::warn!(%message, "program panicked");
            return Outcome::Faulted(fault_report(&capture, &message));
        }
    };

    if let Exit::Message(message) = &exit {
        let mut out = capture.clone();
        // Writes into the capture buffer cannot fail.
        let _ = writeln!(out, "{message}");
    }
    let exit_code = exit.code();
    let sinks = args.sinks();
    if exit_code == 0 && sinks.len() == 1 {
        if let Some(sink) = sinks.values().next() {
            let file = OutputFile::from_sink(sink);
            tracing::info!(name = %file.name, bytes = file.content.len(), "program produced output file");
            return Outcome::OutputFile(file);
        }
    }
    tracing::info!(exit_code, "program completed");
    Outcome::Completed {
        exit_code,
        output: capture.text(),
    }
}

fn fault_report(capture: &CaptureBuffer, message: &str) -> String {
    let mut report = capture.text();
    if !report.is_empty() && !report.ends_with('\n') {
        report.push('\n');
    }
    report.push_str("Error: ");
    report.push_str(message);
    report.push('\n');
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "program panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn run<F>(program: F, args: &DecodedArguments) -> Outcome
    where
        F: Fn(&DecodedArguments, &mut IoContext) -> Result<Exit, ProgramError> + Send + Sync,
    {
        execute(&program, args, None)
    }

    #[test]
    fn captures_stdout_and_stderr_in_order() {
        let outcome = run(
            |_: &DecodedArguments, io: &mut IoContext| {
                writeln!(io.stdout, "out")?;
                writeln!(io.stderr, "err")?;
                Ok(Exit::Success)
            },
            &DecodedArguments::new(),
        );
        assert_eq!(
            outcome,
            Outcome::Completed {
                exit_code: 0,
                output: "out\nerr\n".into()
            }
        );
    }

    #[test]
    fn stdin_is_empty() {
        let outcome = run(
            |_: &DecodedArguments, io: &mut IoContext| {
                let mut input = String::new();
                io.stdin.read_to_string(&mut input)?;
                write!(io.stdout, "{}", input.len())?;
                Ok(Exit::Success)
            },
            &DecodedArguments::new(),
        );
        assert_eq!(
            outcome,
            Outcome::Completed {
                exit_code: 0,
                output: "0".into()
            }
        );
    }

    #[test]
    fn exit_codes_and_messages_are_reported() {
        let outcome = run(
            |_: &DecodedArguments, _: &mut IoContext| Ok(Exit::Code(2)),
            &DecodedArguments::new(),
        );
        assert!(matches!(outcome, Outcome::Completed { exit_code: 2, .. }));

        let outcome = run(
            |_: &DecodedArguments, _: &mut IoContext| Ok(Exit::Message("bad input".into())),
            &DecodedArguments::new(),
        );
        assert_eq!(
            outcome,
            Outcome::Completed {
                exit_code: 1,
                output: "bad input\n".into()
            }
        );
    }

    #[test]
    fn errors_become_faults() {
        let outcome = run(
            |_: &DecodedArguments, io: &mut IoContext| {
                write!(io.stdout, "partial")?;
                Err("disk on fire".into())
            },
            &DecodedArguments::new(),
        );
        assert_eq!(outcome, Outcome::Faulted("partial\nError: disk on fire\n".into()));
    }

    #[test]
    fn panics_become_faults() {
        let outcome = run(
            |_: &DecodedArguments, _: &mut IoContext| -> Result<Exit, ProgramError> {
                panic!("boom")
            },
            &DecodedArguments::new(),
        );
        match outcome {
            Outcome::Faulted(report) => assert!(report.contains("boom")),
            other => panic!("expected a fault, got {other:?}"),
        }
    }

    #[test]
    fn single_populated_sink_becomes_the_response() {
        let mut args = DecodedArguments::new();
        args.insert("dest", Value::Sink(OutputSink::new("hello.txt")));
        let outcome = run(
            |args: &DecodedArguments, io: &mut IoContext| {
                let mut sink = args
                    .get("dest")
                    .and_then(Value::as_sink)
                    .cloned()
                    .ok_or("no sink")?;
                sink.write_all(b"hello")?;
                writeln!(io.stdout, "ignored")?;
                Ok(Exit::Success)
            },
            &args,
        );
        assert_eq!(
            outcome,
            Outcome::OutputFile(OutputFile {
                name: "hello.txt".into(),
                content: b"hello".to_vec(),
                content_type: "text/plain".into(),
                encoding: None,
            })
        );
    }

    #[test]
    fn failing_exit_keeps_text_even_with_a_sink() {
        let mut args = DecodedArguments::new();
        args.insert("dest", Value::Sink(OutputSink::new("out.bin")));
        let outcome = run(
            |_: &DecodedArguments, _: &mut IoContext| Ok(Exit::Code(3)),
            &args,
        );
        assert!(matches!(outcome, Outcome::Completed { exit_code: 3, .. }));
    }

    #[test]
    fn timeout_becomes_the_call_deadline() {
        let report = |_: &DecodedArguments, io: &mut IoContext| -> Result<Exit, ProgramError> {
            write!(io.stdout, "{}", io.deadline().is_some())?;
            Ok(Exit::Success)
        };
        let args = DecodedArguments::new();
        assert!(matches!(
            execute(&report, &args, Some(Duration::from_secs(30))),
            Outcome::Completed { output, .. } if output == "true"
        ));
        assert!(matches!(
            execute(&report, &args, None),
            Outcome::Completed { output, .. } if output == "false"
        ));
    }

    #[test]
    fn concurrent_calls_capture_separately() {
        let slow = |_: &DecodedArguments, io: &mut IoContext| -> Result<Exit, ProgramError> {
            write!(io.stdout, "slow")?;
            std::thread::sleep(Duration::from_millis(100));
            Ok(Exit::Success)
        };
        let fast = |_: &DecodedArguments, io: &mut IoContext| -> Result<Exit, ProgramError> {
            write!(io.stdout, "fast")?;
            Ok(Exit::Success)
        };
        let args = DecodedArguments::new();
        std::thread::scope(|scope| {
            let background = scope.spawn(|| execute(&slow, &args, None));
            assert!(matches!(
                execute(&fast, &args, None),
                Outcome::Completed { output, .. } if output == "fast"
            ));
            assert!(matches!(
                background.join().expect("thread"),
                Outcome::Completed { output, .. } if output == "slow"
            ));
        });
    }

    #[test]
    fn content_type_strips_compression_suffix() {
        assert_eq!(
            guess_content_type("backup.tar.gz"),
            ("application/x-tar".to_string(), Some("gzip"))
        );
        assert_eq!(guess_content_type("notes.txt"), ("text/plain".to_string(), None));
        assert_eq!(
            guess_content_type("blob"),
            ("application/octet-stream".to_string(), None)
        );
    }
}
