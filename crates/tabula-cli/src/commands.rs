use std::fs;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use colored::Colorize;
use tabula::ops::{self, ColumnAction, RowAction};
use tabula::{functions, Header, ListenerReference, Position, Table, TableListenerEvent, Value};

use crate::cli::*;
use crate::config::CliConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    config.apply();
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Repl(args) => cmd_repl(args, &config),
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let script = fs::read_to_string(&args.script)
        .with_context(|| format!("reading {}", args.script.display()))?;
    let mut session = Session::new();
    for (n, line) in script.lines().enumerate() {
        match session.execute(line) {
            Ok(output) => output.iter().for_each(|l| println!("{l}")),
            Err(e) if args.keep_going => {
                eprintln!("{} line {}: {e:#}", "error".red().bold(), n + 1);
            }
            Err(e) => return Err(e.context(format!("{}:{}", args.script.display(), n + 1))),
        }
    }
    Ok(())
}

fn cmd_repl(args: ReplArgs, config: &CliConfig) -> anyhow::Result<()> {
    let prompt = args.prompt.unwrap_or_else(|| config.prompt.clone());
    let mut session = Session::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("{prompt}");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if matches!(line, "exit" | "quit") {
            break;
        }
        match session.execute(line) {
            Ok(output) => output.iter().for_each(|l| println!("{l}")),
            Err(e) => eprintln!("{} {e:#}", "error".red().bold()),
        }
    }
    Ok(())
}

/// Statement interpreter. Tables live in the process registry; the session
/// owns the watch listeners and the lines they print.
pub struct Session {
    watchers: Vec<ListenerReference>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Session {
    pub fn new() -> Self {
        Self { watchers: Vec::new(), log: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Run one statement. Returns the lines to print: events seen by
    /// watchers first, then the statement's own output.
    pub fn execute(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let words = tokenize(line)?;
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let statement = Statement::try_parse_from(words)?;
        let output = self.apply(statement.op);
        let mut lines = std::mem::take(&mut *self.log.lock().expect("watch log lock poisoned"));
        lines.extend(output?);
        Ok(lines)
    }

    fn apply(&mut self, op: Op) -> anyhow::Result<Vec<String>> {
        match op {
            Op::Set { table, header, index, value } => {
                Table::named(table).set(header, index, parse_value(&value)?)?;
                Ok(Vec::new())
            }
            Op::Get { table, header, index, relation } => {
                let cell = existing(&table)?.column(header).get(relation.into(), index);
                Ok(vec![format!("{}:{} = {}", cell.header(), cell.index(), show(cell.value()))])
            }
            Op::Clear { table, header, index } => {
                let t = existing(&table)?;
                match (header, index) {
                    (Some(h), Some(i)) => t.clear_cell(h, i)?,
                    (Some(h), None) => ops::clear_column(&t.column(h))?,
                    _ => ops::clear_table(&t)?,
                }
                Ok(Vec::new())
            }
            Op::Show { table } => Ok(render(&existing(&table)?)),
            Op::Headers { table } => {
                let headers = existing(&table)?.headers();
                Ok(vec![headers.iter().map(|h| h.to_string().cyan().bold().to_string()).collect::<Vec<_>>().join(" ")])
            }
            Op::Indexes { table } => {
                let indexes = existing(&table)?.indexes();
                Ok(vec![indexes.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" ")])
            }
            Op::CopyColumn(edit) => edit_column(edit, false),
            Op::MoveColumn(edit) => edit_column(edit, true),
            Op::CopyRow(edit) => edit_row(edit, false),
            Op::MoveRow(edit) => edit_row(edit, true),
            Op::Rename { table, header, name } => {
                let column = existing_column(&table, header)?;
                ops::rename(&column, name)?;
                Ok(Vec::new())
            }
            Op::RemoveColumn { table, header } => {
                ops::remove_column(&existing_column(&table, header)?)?;
                Ok(Vec::new())
            }
            Op::RemoveRow { table, index } => {
                ops::remove_row(&existing(&table)?.row(index))?;
                Ok(Vec::new())
            }
            Op::Watch { table, header } => self.watch(&table, header),
            Op::Sum { table, header } => {
                let total = functions::sum(existing(&table)?.column(header).iter())?;
                Ok(vec![show(&total)])
            }
            Op::Tables => Ok(Table::names()),
            Op::Delete { table } => {
                if !Table::delete(&table) {
                    bail!("no table named {table}");
                }
                self.watchers.retain(|w| w.is_active());
                Ok(Vec::new())
            }
        }
    }

    fn watch(&mut self, table: &str, header: Option<Header>) -> anyhow::Result<Vec<String>> {
        let t = existing(table)?;
        let (builder, target) = match header {
            Some(h) => (t.column(h.clone()).on(), format!("{table}/{h}")),
            None => (t.on(), table.to_string()),
        };
        let log = self.log.clone();
        let prefix = table.to_string();
        let reference = builder.name(format!("watch {target}")).skip_history().events(move |events| {
            let mut log = log.lock().expect("watch log lock poisoned");
            log.extend(events.iter().map(|e| format_event(&prefix, e)));
            Ok(())
        })?;
        self.watchers.push(reference);
        Ok(vec![format!("watching {}", target.bold())])
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for watcher in self.watchers.drain(..) {
            watcher.off();
        }
    }
}

fn edit_column(edit: ColumnEdit, moving: bool) -> anyhow::Result<Vec<String>> {
    let source = existing_column(&edit.table, edit.header)?;
    let target = Table::named(edit.target);
    let action = match (edit.anchor, edit.position) {
        (Some(anchor), position) => {
            let anchor = target.column(anchor);
            match Position::from(position) {
                Position::To => ColumnAction::to(&source, &anchor),
                Position::Before => ColumnAction::before(&source, &anchor),
                Position::After => ColumnAction::after(&source, &anchor),
            }
        }
        (None, PositionArg::To) => ColumnAction::to_table(&source, &target),
        (None, _) => bail!("before and after need an anchor column"),
    };
    match (edit.name, moving) {
        (Some(name), true) => ops::move_as(action, name)?,
        (Some(name), false) => ops::copy_as(action, name)?,
        (None, true) => ops::move_(action)?,
        (None, false) => ops::copy(action)?,
    }
    Ok(Vec::new())
}

fn edit_row(edit: RowEdit, moving: bool) -> anyhow::Result<Vec<String>> {
    let source = existing(&edit.table)?.row(edit.index);
    let anchor = Table::named(edit.target).row(edit.anchor);
    let action = match Position::from(edit.position) {
        Position::To => RowAction::to(&source, &anchor),
        Position::Before => RowAction::before(&source, &anchor),
        Position::After => RowAction::after(&source, &anchor),
    };
    if moving {
        ops::move_(action)?;
    } else {
        ops::copy(action)?;
    }
    Ok(Vec::new())
}

fn existing(name: &str) -> anyhow::Result<Table> {
    Table::lookup(name).ok_or_else(|| anyhow!("no table named {name}"))
}

fn existing_column(table: &str, header: Header) -> anyhow::Result<tabula::Column> {
    let column = existing(table)?.column(header);
    if !column.exists() {
        bail!("no column {} in {table}", column.header());
    }
    Ok(column)
}

/// A JSON literal, or the word itself as text.
fn parse_value(word: &str) -> anyhow::Result<Value> {
    match serde_json::from_str::<serde_json::Value>(word) {
        Ok(json) => Ok(Value::try_from(json)?),
        Err(_) => Ok(Value::from(word)),
    }
}

fn show(value: &Value) -> String {
    if value.is_empty() {
        "(empty)".dimmed().to_string()
    } else {
        value.to_string()
    }
}

fn format_event(table: &str, event: &TableListenerEvent) -> String {
    format!(
        "{} {}:{} {} {} {}",
        table.blue(),
        event.header().to_string().cyan(),
        event.index(),
        show(event.old_value()),
        "->".dimmed(),
        show(event.new_value()).green(),
    )
}

/// The table as a grid: headers across, populated rows down.
fn render(table: &Table) -> Vec<String> {
    let snapshot = table.snapshot();
    let headers = snapshot.headers();
    if headers.is_empty() {
        return vec![format!("{table} is empty").dimmed().to_string()];
    }
    let mut grid = vec![std::iter::once(String::new()).chain(headers.iter().map(|h| h.to_string())).collect::<Vec<_>>()];
    for index in snapshot.indexes() {
        let mut row = vec![index.to_string()];
        row.extend(headers.iter().map(|h| snapshot.get(h, index).to_string()));
        grid.push(row);
    }
    let widths: Vec<usize> = (0..=headers.len())
        .map(|c| grid.iter().map(|row| row[c].chars().count()).max().unwrap_or(0))
        .collect();
    grid.iter()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .zip(&widths)
                .enumerate()
                .map(|(c, (text, &width))| {
                    let padded = format!("{text:<width$}");
                    match (r, c) {
                        (0, _) => padded.cyan().bold().to_string(),
                        (_, 0) => padded.dimmed().to_string(),
                        _ => padded,
                    }
                })
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        })
        .collect()
}
