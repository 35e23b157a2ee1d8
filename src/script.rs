//! Replay scripts: declared types plus per-thread enter/exit event streams.
//!
//! ```text
//! # types are declared the way a loader would see them
//! type com.acme.Parser
//!   ctor com.acme.Parser()
//!   method com.acme.Parser.parse(java.lang.String)
//!   method com.acme.Parser.close() empty
//!
//! # each thread section runs on its own thread, x4 runs four copies
//! thread worker x4
//!   enter com.acme.Parser()
//!   exit
//!   enter com.acme.Parser.parse(java.lang.String)
//!   work 150
//!   exit
//! ```
//!
//! Tokens are whitespace separated, so descriptors cannot contain spaces.
//! `work` sleeps for the given number of microseconds. `enter #<id>` fires
//! the hook with a raw routine id.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use calltrace_runtime::MethodId;

use crate::error::Error;
use crate::selection::{RoutineDecl, TypeDecl};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Enter(String),
    EnterId(MethodId),
    Work(Duration),
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadScript {
    pub name: String,
    pub copies: usize,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub types: Vec<TypeDecl>,
    pub threads: Vec<ThreadScript>,
}

enum Section {
    None,
    Type,
    Thread { open: usize, opened_at: usize },
}

impl Script {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ScriptRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut script = Script::default();
        let mut section = Section::None;
        let mut entered: Vec<(usize, String)> = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let mut tokens: Vec<&str> = raw.split_whitespace().collect();
            // A comment starts at the first '#' token, except the id of `enter #<id>`.
            let comment = tokens
                .iter()
                .enumerate()
                .position(|(i, t)| t.starts_with('#') && !(i == 1 && tokens[0] == "enter"));
            if let Some(at) = comment {
                tokens.truncate(at);
            }
            let Some((&directive, args)) = tokens.split_first() else {
                continue;
            };

            match directive {
                "type" => {
                    close_thread(&section, &script)?;
                    let (name, flags) = args
                        .split_first()
                        .ok_or_else(|| parse_error(line, "type needs a name"))?;
                    let mut decl = TypeDecl::new(*name);
                    for flag in flags {
                        match *flag {
                            "interface" => decl.is_interface = true,
                            other => {
                                return Err(parse_error(line, format!("unknown type flag '{other}'")));
                            }
                        }
                    }
                    script.types.push(decl);
                    section = Section::Type;
                }
                "method" | "ctor" => {
                    if !matches!(section, Section::Type) {
                        return Err(parse_error(line, format!("{directive} outside a type section")));
                    }
                    let (descriptor, flags) = args
                        .split_first()
                        .ok_or_else(|| parse_error(line, format!("{directive} needs a descriptor")))?;
                    let mut routine = if directive == "ctor" {
                        RoutineDecl::constructor(*descriptor)
                    } else {
                        RoutineDecl::method(*descriptor)
                    };
                    for flag in flags {
                        match *flag {
                            "native" => routine.is_native = true,
                            "empty" if directive == "method" => routine.is_empty = true,
                            other => {
                                return Err(parse_error(
                                    line,
                                    format!("unknown {directive} flag '{other}'"),
                                ));
                            }
                        }
                    }
                    if let Some(decl) = script.types.last_mut() {
                        decl.routines.push(routine);
                    }
                }
                "thread" => {
                    close_thread(&section, &script)?;
                    let name = args
                        .first()
                        .ok_or_else(|| parse_error(line, "thread needs a name"))?;
                    let copies = match args.get(1) {
                        None => 1,
                        Some(spec) => spec
                            .strip_prefix('x')
                            .and_then(|n| n.parse::<usize>().ok())
                            .filter(|&n| n > 0)
                            .ok_or_else(|| {
                                parse_error(line, format!("bad copy count '{spec}', expected x<N>"))
                            })?,
                    };
                    if args.len() > 2 {
                        return Err(parse_error(line, "unexpected tokens after copy count"));
                    }
                    script.threads.push(ThreadScript {
                        name: (*name).to_owned(),
                        copies,
                        events: Vec::new(),
                    });
                    section = Section::Thread {
                        open: 0,
                        opened_at: line,
                    };
                }
                "enter" | "exit" | "work" => {
                    let Section::Thread { open, .. } = &mut section else {
                        return Err(parse_error(line, format!("{directive} outside a thread section")));
                    };
                    let event = match directive {
                        "enter" => {
                            let target = single_arg(line, directive, args)?;
                            *open += 1;
                            match target.strip_prefix('#') {
                                Some(raw) => {
                                    let id = raw.parse::<u64>().map_err(|_| {
                                        parse_error(line, format!("bad routine id '{target}'"))
                                    })?;
                                    Event::EnterId(MethodId::new(id))
                                }
                                None => {
                                    entered.push((line, target.to_owned()));
                                    Event::Enter(target.to_owned())
                                }
                            }
                        }
                        "exit" => {
                            if !args.is_empty() {
                                return Err(parse_error(line, "exit takes no arguments"));
                            }
                            *open = open
                                .checked_sub(1)
                                .ok_or_else(|| parse_error(line, "exit without matching enter"))?;
                            Event::Exit
                        }
                        _ => {
                            let micros = single_arg(line, directive, args)?
                                .parse::<u64>()
                                .map_err(|_| parse_error(line, "work needs microseconds"))?;
                            Event::Work(Duration::from_micros(micros))
                        }
                    };
                    if let Some(thread) = script.threads.last_mut() {
                        thread.events.push(event);
                    }
                }
                other => return Err(parse_error(line, format!("unknown directive '{other}'"))),
            }
        }
        close_thread(&section, &script)?;

        let declared: HashSet<&str> = script
            .types
            .iter()
            .flat_map(|t| t.routines.iter().map(|r| r.descriptor.as_str()))
            .collect();
        if let Some((line, name)) = entered.iter().find(|(_, name)| !declared.contains(name.as_str())) {
            return Err(parse_error(*line, format!("enter of undeclared routine '{name}'")));
        }
        Ok(script)
    }
}

fn close_thread(section: &Section, script: &Script) -> Result<(), Error> {
    if let Section::Thread { open, opened_at } = section {
        if *open > 0 {
            let name = script.threads.last().map_or("", |t| t.name.as_str());
            return Err(parse_error(
                *opened_at,
                format!("thread '{name}' ends with {open} unmatched enter(s)"),
            ));
        }
    }
    Ok(())
}

fn single_arg<'a>(line: usize, directive: &str, args: &[&'a str]) -> Result<&'a str, Error> {
    match args {
        [arg] => Ok(*arg),
        _ => Err(parse_error(line, format!("{directive} takes exactly one argument"))),
    }
}

fn parse_error(line: usize, reason: impl Into<String>) -> Error {
    Error::ScriptParse {
        line,
        reason: reason.into(),
    }
}
