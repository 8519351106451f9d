use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::decode::DecodedArguments;
use crate::error::ProgramError;
use crate::execute::{Exit, IoContext, Program};
use crate::schema::{ActionKind, Schema, ValueType};
use crate::ticket::ChoiceValue;
use crate::value::{OutputSink, Value};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs an external executable, rebuilding its command line from the
/// decoded arguments in schema order. Positional values follow a `--` so
/// they are never read as options.
#[derive(Debug, Clone)]
pub struct CommandProgram {
    program: String,
    base_args: Vec<String>,
    params: Vec<ArgvParam>,
}

#[derive(Debug, Clone)]
struct ArgvParam {
    dest: String,
    /// First option string; `None` for positionals.
    option: Option<String>,
    kind: ArgvKind,
}

#[derive(Debug, Clone)]
enum ArgvKind {
    Flag(ChoiceValue),
    Value,
    FileIn,
    FileOut,
}

impl CommandProgram {
    pub fn new(program: impl Into<String>, schema: &Schema) -> Self {
        let params = schema
            .params()
            .filter(|spec| spec.action == ActionKind::Store)
            .map(|spec| ArgvParam {
                dest: spec.name.clone(),
                option: spec.flags.first().cloned(),
                kind: match &spec.value_type {
                    ValueType::Flag { constant } => ArgvKind::Flag(constant.clone()),
                    ValueType::FileIn => ArgvKind::FileIn,
                    ValueType::FileOut => ArgvKind::FileOut,
                    _ => ArgvKind::Value,
                },
            })
            .collect();
        Self {
            program: program.into(),
            base_args: Vec::new(),
            params,
        }
    }

    /// Arguments placed before the synthesized ones.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the argument vector. Uploads are written below `workdir`, and
    /// each output destination gets a path there whose content is later
    /// copied into its sink.
    fn argv(
        &self,
        args: &DecodedArguments,
        workdir: &Path,
    ) -> Result<(Vec<OsString>, Vec<(PathBuf, OutputSink)>), ProgramError> {
        let mut argv: Vec<OsString> = Vec::new();
        let mut positionals: Vec<OsString> = Vec::new();
        let mut outputs = Vec::new();

        for (index, param) in self.params.iter().enumerate() {
            let Some(value) = args.get(&param.dest) else {
                continue;
            };
            if value.is_none() {
                continue;
            }

            let mut values: Vec<OsString> = Vec::new();
            match &param.kind {
                ArgvKind::Flag(constant) => {
                    if **constant == *value {
                        if let Some(option) = &param.option {
                            argv.push(option.into());
                        }
                    }
                    continue;
                }
                ArgvKind::FileIn => {
                    let files: Vec<&Value> = match value {
                        Value::List(items) => items.iter().collect(),
                        single => vec![single],
                    };
                    for (n, file) in files.into_iter().filter_map(Value::as_file).enumerate() {
                        let dir = workdir.join(format!("in-{index}-{n}"));
                        fs::create_dir_all(&dir)?;
                        let path = dir.join(base_name(&file.name, "upload"));
                        fs::write(&path, &file.content)?;
                        values.push(path.into_os_string());
                    }
                }
                ArgvKind::FileOut => {
                    let Some(sink) = value.as_sink() else {
                        continue;
                    };
                    let dir = workdir.join(format!("out-{index}"));
                    fs::create_dir_all(&dir)?;
                    let path = dir.join(base_name(sink.name(), "output"));
                    values.push(path.clone().into_os_string());
                    outputs.push((path, sink.clone()));
                }
                ArgvKind::Value => {
                    let items: Vec<&Value> = match value {
                        Value::List(items) => items.iter().filter(|item| !item.is_none()).collect(),
                        single => vec![single],
                    };
                    for item in items {
                        values.push(item.to_form_string()?.into());
                    }
                }
            }

            if values.is_empty() {
                continue;
            }
            match &param.option {
                Some(option) => {
                    argv.push(option.into());
                    argv.extend(values);
                }
                None => positionals.extend(values),
            }
        }
        if !positionals.is_empty() {
            argv.push("--".into());
            argv.extend(positionals);
        }
        Ok((argv, outputs))
    }
}

fn base_name<'a>(name: &'a str, fallback: &'a str) -> &'a str {
    Path::new(name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(fallback)
}

impl Program for CommandProgram {
    fn run(&self, args: &DecodedArguments, io: &mut IoContext) -> Result<Exit, ProgramError> {
        let workdir = tempfile::tempdir()?;
        let (argv, outputs) = self.argv(args, workdir.path())?;
        tracing::info!(program = %self.program, ?argv, "running command");

        let stdout_path = workdir.path().join("stdout");
        let stderr_path = workdir.path().join("stderr");
        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(File::create(&stdout_path)?)
            .stderr(File::create(&stderr_path)?)
            .spawn()?;
        let status = wait_until(&mut child, io.deadline())?;
        io.stdout.write_all(&fs::read(&stdout_path)?)?;
        io.stdout.write_all(&fs::read(&stderr_path)?)?;

        let Some(status) = status else {
            return Err(format!("{} did not finish in time and was killed", self.program).into());
        };

        for (path, mut sink) in outputs {
            if path.exists() {
                sink.write_all(&fs::read(&path)?)?;
            }
        }

        match status.code() {
            Some(0) => Ok(Exit::Success),
            Some(code) => Ok(Exit::Code(code)),
            None => Err(format!("{} was terminated by a signal", self.program).into()),
        }
    }
}

/// Wait for `child`, killing it once `deadline` passes. `None` means it was
/// killed.
fn wait_until(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            tracing::warn!(pid = child.id(), "deadline passed, killing command");
            if let Err(err) = child.kill() {
                tracing::warn!(error = %err, "kill failed");
            }
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::execute::{Outcome, execute};
    use crate::schema::{Arity, Group, ParameterSpec};
    use crate::value::InputFile;

    fn schema() -> Schema {
        Schema::new("tool").group(
            Group::new("options")
                .param(ParameterSpec::help_action())
                .param(ParameterSpec::flag("verbose", true, false).flags(["-v", "--verbose"]))
                .param(
                    ParameterSpec::new("level")
                        .flags(["--level"])
                        .value_type(ValueType::Integer),
                )
                .param(ParameterSpec::new("sources").arity(Arity::OneOrMore)),
        )
    }

    fn strings(argv: &[OsString]) -> Vec<String> {
        argv.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn argv_follows_schema_order() {
        let program = CommandProgram::new("tool", &schema());
        let mut args = DecodedArguments::new();
        args.insert("verbose", Value::Bool(true));
        args.insert("level", Value::Int(9));
        args.insert("sources", Value::from(vec!["a.txt", "b.txt"]));

        let workdir = tempfile::tempdir().expect("tempdir");
        let (argv, outputs) = program.argv(&args, workdir.path()).expect("argv");
        assert_eq!(strings(&argv), ["-v", "--level", "9", "--", "a.txt", "b.txt"]);
        assert!(outputs.is_empty());
    }

    #[test]
    fn unset_flags_and_missing_values_are_omitted() {
        let program = CommandProgram::new("tool", &schema());
        let mut args = DecodedArguments::new();
        args.insert("verbose", Value::Bool(false));
        args.insert("level", Value::None);
        args.insert("sources", Value::List(vec![Value::None]));

        let workdir = tempfile::tempdir().expect("tempdir");
        let (argv, _) = program.argv(&args, workdir.path()).expect("argv");
        assert!(argv.is_empty());
    }

    #[test]
    fn dash_leading_positionals_stay_operands() {
        let schema = Schema::new("rm").group(
            Group::new("positional arguments")
                .param(ParameterSpec::new("target").arity(Arity::OneOrMore))
                .param(ParameterSpec::new("force").flags(["--force"])),
        );
        let program = CommandProgram::new("rm", &schema);
        let mut args = DecodedArguments::new();
        args.insert("target", Value::from(vec!["-rf", "notes"]));
        args.insert("force", Value::from("no"));

        let workdir = tempfile::tempdir().expect("tempdir");
        let (argv, _) = program.argv(&args, workdir.path()).expect("argv");
        assert_eq!(strings(&argv), ["--force", "no", "--", "-rf", "notes"]);
    }

    #[test]
    fn echoes_through_the_shell() {
        let program = CommandProgram::new("sh", &schema()).args(["-c", r#"echo "$@""#, "sh"]);
        let mut args = DecodedArguments::new();
        args.insert("sources", Value::from(vec!["Ada"]));
        let outcome = execute(&program, &args, None);
        assert_eq!(
            outcome,
            Outcome::Completed {
                exit_code: 0,
                output: "-- Ada\n".into()
            }
        );
    }

    #[test]
    fn uploads_are_passed_as_paths() {
        let schema = Schema::new("cat").group(
            Group::new("positional arguments")
                .param(ParameterSpec::new("data").value_type(ValueType::FileIn)),
        );
        let program = CommandProgram::new("sh", &schema).args(["-c", r#"cat "$2""#, "sh"]);
        let mut args = DecodedArguments::new();
        args.insert("data", Value::File(InputFile::new("rows.csv", "a,b\n")));
        let outcome = execute(&program, &args, None);
        assert_eq!(
            outcome,
            Outcome::Completed {
                exit_code: 0,
                output: "a,b\n".into()
            }
        );
    }

    #[test]
    fn output_paths_fill_their_sinks() {
        let schema = Schema::new("writer").group(
            Group::new("positional arguments")
                .param(ParameterSpec::new("dest").value_type(ValueType::FileOut)),
        );
        let program =
            CommandProgram::new("sh", &schema).args(["-c", r#"printf hello > "$2""#, "sh"]);
        let mut args = DecodedArguments::new();
        args.insert("dest", Value::Sink(OutputSink::new("greeting.txt")));
        match execute(&program, &args, None) {
            Outcome::OutputFile(file) => {
                assert_eq!(file.name, "greeting.txt");
                assert_eq!(file.content, b"hello");
            }
            other => panic!("expected an output file, got {other:?}"),
        }
    }

    #[test]
    fn exit_status_is_propagated() {
        let program = CommandProgram::new("sh", &schema()).args(["-c", "echo nope >&2; exit 3"]);
        let outcome = execute(&program, &DecodedArguments::new(), None);
        assert_eq!(
            outcome,
            Outcome::Completed {
                exit_code: 3,
                output: "nope\n".into()
            }
        );
    }

    #[test]
    fn missing_executable_is_a_fault() {
        let program = CommandProgram::new("/nonexistent/webwrap-test-binary", &schema());
        let outcome = execute(&program, &DecodedArguments::new(), None);
        assert!(matches!(outcome, Outcome::Faulted(_)));
    }

    #[test]
    fn overdue_commands_are_killed() {
        let program = CommandProgram::new("sh", &schema()).args(["-c", "echo started; sleep 5"]);
        let started = Instant::now();
        let timeout = Some(Duration::from_millis(200));
        let outcome = execute(&program, &DecodedArguments::new(), timeout);
        assert!(started.elapsed() < Duration::from_secs(3), "command was not killed");
        match outcome {
            Outcome::Faulted(report) => {
                assert!(report.starts_with("started\n"), "report: {report}");
                assert!(report.contains("was killed"), "report: {report}");
            }
            other => panic!("expected a fault, got {other:?}"),
        }
    }
}
