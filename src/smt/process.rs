//! SMT-LIB2 child-process backend.
//!
//! Drives an external SMT solver (z3 by default) through system pipes:
//! commands are printed as SMT-LIB2 s-expressions on the child's stdin,
//! responses are read back from its stdout. The solver binary must be
//! on the PATH, or the command can be overridden through the
//! `SMTSCHED_SOLVER_CMD` environment variable.
//!
//! Optimization objectives are registered with `(minimize ...)` /
//! `(maximize ...)` and the multi-objective mode with
//! `(set-option :opt.priority ...)`, matching the z3 optimize facility.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::BackendError;

use super::backend::{CheckOutcome, Model, OptimizePriority, SmtBackend, Value};
use super::term::{Sort, Term};

/// Environment variable overriding the solver command line.
pub const SOLVER_CMD_ENV: &str = "SMTSCHED_SOLVER_CMD";

/// A minimal s-expression, just enough for `get-value` responses.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sexpr {
    Atom(String),
    List(Vec<Sexpr>),
}

/// The child-process backend.
pub struct ProcessBackend {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    declarations: Vec<(String, Sort)>,
    decl_marks: Vec<usize>,
    check_deadline: Duration,
    last_outcome: Option<CheckOutcome>,
    last_core: Vec<Term>,
}

impl ProcessBackend {
    /// Spawns the default z3 command (`z3 -smt2 -in`), honoring
    /// [`SOLVER_CMD_ENV`].
    pub fn z3() -> Result<Self, BackendError> {
        match std::env::var(SOLVER_CMD_ENV) {
            Ok(cmd) => {
                let mut parts = cmd.split_whitespace();
                let program = parts
                    .next()
                    .ok_or_else(|| BackendError::Process("empty solver command".into()))?
                    .to_string();
                let args: Vec<String> = parts.map(str::to_string).collect();
                Self::spawn(&program, &args)
            }
            Err(_) => Self::spawn("z3", &["-smt2".into(), "-in".into()]),
        }
    }

    /// Spawns an arbitrary SMT-LIB2 solver command.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, BackendError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BackendError::Process(format!("failed to spawn '{program}': {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Process("no stdin pipe".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Process("no stdout pipe".into()))?;
        let mut backend = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            declarations: Vec::new(),
            decl_marks: Vec::new(),
            check_deadline: Duration::from_secs(60),
            last_outcome: None,
            last_core: Vec::new(),
        };
        backend.send("(set-option :produce-models true)")?;
        backend.send("(set-option :produce-unsat-assumptions true)")?;
        Ok(backend)
    }

    /// Whether the default solver command can be spawned on this system.
    pub fn is_available() -> bool {
        Self::z3().is_ok()
    }

    fn send(&mut self, command: &str) -> Result<(), BackendError> {
        debug!(target: "smtsched::backend", command, "smt2 >>");
        writeln!(self.stdin, "{command}")
            .and_then(|_| self.stdin.flush())
            .map_err(|e| BackendError::Process(format!("write failed: {e}")))
    }

    /// Reads one balanced s-expression (or a bare atom line).
    fn read_response(&mut self) -> Result<String, BackendError> {
        let mut buf = String::new();
        let mut depth: i64 = 0;
        loop {
            let mut line = String::new();
            let n = self
                .stdout
                .read_line(&mut line)
                .map_err(|e| BackendError::Process(format!("read failed: {e}")))?;
            if n == 0 {
                return Err(BackendError::Process("solver closed its pipe".into()));
            }
            depth += line.matches('(').count() as i64;
            depth -= line.matches(')').count() as i64;
            buf.push_str(&line);
            if depth <= 0 && !buf.trim().is_empty() {
                break;
            }
        }
        let response = buf.trim().to_string();
        debug!(target: "smtsched::backend", response = %response, "smt2 <<");
        if response.starts_with("(error") {
            return Err(BackendError::Process(response));
        }
        Ok(response)
    }

    fn parse_sexpr(input: &str) -> Result<Sexpr, BackendError> {
        let tokens = tokenize(input);
        let mut pos = 0;
        let expr = parse_tokens(&tokens, &mut pos)
            .ok_or_else(|| BackendError::Parse(input.to_string()))?;
        Ok(expr)
    }

    fn parse_value(expr: &Sexpr) -> Option<Value> {
        match expr {
            Sexpr::Atom(a) => match a.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                other => other.parse::<i64>().ok().map(Value::Int),
            },
            // Negative integers print as (- n).
            Sexpr::List(items) => match items.as_slice() {
                [Sexpr::Atom(minus), Sexpr::Atom(n)] if minus == "-" => {
                    n.parse::<i64>().ok().map(|v| Value::Int(-v))
                }
                _ => None,
            },
        }
    }
}

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in input.chars() {
        match ch {
            '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(ch.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_tokens(tokens: &[String], pos: &mut usize) -> Option<Sexpr> {
    let token = tokens.get(*pos)?;
    *pos += 1;
    if token == "(" {
        let mut items = Vec::new();
        while tokens.get(*pos)? != ")" {
            items.push(parse_tokens(tokens, pos)?);
        }
        *pos += 1;
        Some(Sexpr::List(items))
    } else if token == ")" {
        None
    } else {
        Some(Sexpr::Atom(token.clone()))
    }
}

impl SmtBackend for ProcessBackend {
    fn declare(&mut self, name: &str, sort: Sort) -> Result<(), BackendError> {
        self.declarations.push((name.to_string(), sort));
        self.send(&format!("(declare-const {name} {sort})"))
    }

    fn assert(&mut self, term: Term) -> Result<(), BackendError> {
        self.send(&format!("(assert {})", term.to_smtlib()))
    }

    fn push(&mut self) -> Result<(), BackendError> {
        self.decl_marks.push(self.declarations.len());
        self.send("(push 1)")
    }

    fn pop(&mut self) -> Result<(), BackendError> {
        let mark = self
            .decl_marks
            .pop()
            .ok_or_else(|| BackendError::Process("pop without matching push".into()))?;
        self.declarations.truncate(mark);
        self.send("(pop 1)")
    }

    fn check(&mut self, assumptions: &[Term]) -> Result<CheckOutcome, BackendError> {
        let command = if assumptions.is_empty() {
            "(check-sat)".to_string()
        } else {
            let literals: Vec<String> = assumptions.iter().map(Term::to_smtlib).collect();
            format!("(check-sat-assuming ({}))", literals.join(" "))
        };
        let started = std::time::Instant::now();
        self.send(&command)?;
        let verdict = self.read_response()?;
        let outcome = match verdict.as_str() {
            "sat" => CheckOutcome::Sat,
            "unsat" => CheckOutcome::Unsat,
            "unknown" => {
                // A solver hitting its :timeout option answers unknown;
                // report it as a timeout when the budget was spent.
                if started.elapsed() >= self.check_deadline {
                    CheckOutcome::Timeout
                } else {
                    CheckOutcome::Unknown
                }
            }
            other => {
                warn!(target: "smtsched::backend", verdict = other, "unexpected check verdict");
                return Err(BackendError::Parse(other.to_string()));
            }
        };
        self.last_outcome = Some(outcome);
        self.last_core.clear();
        if outcome == CheckOutcome::Unsat && !assumptions.is_empty() {
            self.send("(get-unsat-assumptions)")?;
            let response = self.read_response()?;
            let parsed = Self::parse_sexpr(&response)?;
            if let Sexpr::List(items) = parsed {
                let mut core = Vec::new();
                for item in items {
                    match item {
                        Sexpr::Atom(name) => core.push(Term::bool_var(name)),
                        Sexpr::List(inner) => {
                            if let [Sexpr::Atom(not), Sexpr::Atom(name)] = inner.as_slice() {
                                if not == "not" {
                                    core.push(Term::Not(Box::new(Term::bool_var(name.clone()))));
                                }
                            }
                        }
                    }
                }
                self.last_core = core;
            }
        }
        Ok(outcome)
    }

    fn model(&mut self) -> Result<Model, BackendError> {
        self.fetch_model()
    }

    fn unsat_core(&self) -> Result<Vec<Term>, BackendError> {
        Ok(self.last_core.clone())
    }

    fn set_logic(&mut self, logic: &str) -> Result<(), BackendError> {
        self.send(&format!("(set-logic {logic})"))
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), BackendError> {
        self.check_deadline = timeout;
        self.send(&format!("(set-option :timeout {})", timeout.as_millis()))
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<(), BackendError> {
        self.send(&format!("(set-option :{key} {value})"))
    }

    fn minimize(&mut self, term: Term) -> Result<(), BackendError> {
        self.send(&format!("(minimize {})", term.to_smtlib()))
    }

    fn maximize(&mut self, term: Term) -> Result<(), BackendError> {
        self.send(&format!("(maximize {})", term.to_smtlib()))
    }

    fn set_optimize_priority(&mut self, priority: OptimizePriority) -> Result<(), BackendError> {
        let mode = match priority {
            OptimizePriority::Lex => "lex",
            OptimizePriority::Box => "box",
            OptimizePriority::Pareto => "pareto",
        };
        self.send(&format!("(set-option :opt.priority {mode})"))
    }

    fn supports_optimization(&self) -> bool {
        true
    }
}

impl ProcessBackend {
    /// Queries the values of all declared variables from the last `sat`
    /// check through `(get-value ...)`.
    fn fetch_model(&mut self) -> Result<Model, BackendError> {
        if self.last_outcome != Some(CheckOutcome::Sat) {
            return Err(BackendError::Process("no model available".into()));
        }
        let mut model = Model::new();
        if self.declarations.is_empty() {
            return Ok(model);
        }
        let names: Vec<String> = self.declarations.iter().map(|(n, _)| n.clone()).collect();
        self.send(&format!("(get-value ({}))", names.join(" ")))?;
        let response = self.read_response()?;
        let parsed = Self::parse_sexpr(&response)?;
        let Sexpr::List(pairs) = parsed else {
            return Err(BackendError::Parse(response));
        };
        for pair in pairs {
            if let Sexpr::List(items) = pair {
                if let [Sexpr::Atom(name), value] = items.as_slice() {
                    if let Some(v) = Self::parse_value(value) {
                        model.insert(name.clone(), v);
                    }
                }
            }
        }
        Ok(model)
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        let _ = self.send("(exit)");
        let _ = self.child.wait();
    }
}
