use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tabula::{Header, Index, IndexRelation, Position};

#[derive(Parser)]
#[command(
    name = "tabula",
    about = "Tabula -- reactive, versioned tables",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML file with the math context and REPL settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute a script, one statement per line
    Run(RunArgs),
    /// Read statements from stdin
    Repl(ReplArgs),
}

#[derive(Args)]
pub struct RunArgs {
    pub script: PathBuf,
    /// Report failing lines and continue
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Args)]
pub struct ReplArgs {
    #[arg(long)]
    pub prompt: Option<String>,
}

/// One statement of a script or REPL session.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_subcommand = true)]
pub struct Statement {
    #[command(subcommand)]
    pub op: Op,
}

#[derive(Subcommand, Debug)]
pub enum Op {
    /// Write a value: a JSON literal, or bare text
    #[command(allow_negative_numbers = true)]
    Set {
        #[arg(value_parser = parse_name)]
        table: String,
        #[arg(value_parser = parse_header)]
        header: Header,
        index: Index,
        value: String,
    },
    /// Read a cell, optionally resolving to a nearby row
    #[command(allow_negative_numbers = true)]
    Get {
        #[arg(value_parser = parse_name)]
        table: String,
        #[arg(value_parser = parse_header)]
        header: Header,
        index: Index,
        #[arg(long, value_enum, default_value = "at")]
        relation: RelationArg,
    },
    /// Clear a cell, a column, or the whole table
    #[command(allow_negative_numbers = true)]
    Clear {
        #[arg(value_parser = parse_name)]
        table: String,
        #[arg(value_parser = parse_header)]
        header: Option<Header>,
        index: Option<Index>,
    },
    /// Print the table as a grid
    Show {
        #[arg(value_parser = parse_name)]
        table: String,
    },
    Headers {
        #[arg(value_parser = parse_name)]
        table: String,
    },
    Indexes {
        #[arg(value_parser = parse_name)]
        table: String,
    },
    CopyColumn(ColumnEdit),
    MoveColumn(ColumnEdit),
    #[command(allow_negative_numbers = true)]
    CopyRow(RowEdit),
    #[command(allow_negative_numbers = true)]
    MoveRow(RowEdit),
    Rename {
        #[arg(value_parser = parse_name)]
        table: String,
        #[arg(value_parser = parse_header)]
        header: Header,
        #[arg(value_parser = parse_header)]
        name: Header,
    },
    RemoveColumn {
        #[arg(value_parser = parse_name)]
        table: String,
        #[arg(value_parser = parse_header)]
        header: Header,
    },
    #[command(allow_negative_numbers = true)]
    RemoveRow {
        #[arg(value_parser = parse_name)]
        table: String,
        index: Index,
    },
    /// Print every change to a table or column from now on
    Watch {
        #[arg(value_parser = parse_name)]
        table: String,
        #[arg(value_parser = parse_header)]
        header: Option<Header>,
    },
    /// Sum the numeric cells of a column
    Sum {
        #[arg(value_parser = parse_name)]
        table: String,
        #[arg(value_parser = parse_header)]
        header: Header,
    },
    /// List registered tables
    Tables,
    Delete {
        #[arg(value_parser = parse_name)]
        table: String,
    },
}

/// `<table> <header> <position> <target> [anchor]`. Without an anchor the
/// column is appended to the target table.
#[derive(Args, Debug)]
pub struct ColumnEdit {
    #[arg(value_parser = parse_name)]
    pub table: String,
    #[arg(value_parser = parse_header)]
    pub header: Header,
    #[arg(value_enum)]
    pub position: PositionArg,
    #[arg(value_parser = parse_name)]
    pub target: String,
    #[arg(value_parser = parse_header)]
    pub anchor: Option<Header>,
    /// Header of the column at its destination
    #[arg(long = "as", value_parser = parse_header)]
    pub name: Option<Header>,
}

/// `<table> <index> <position> <target> <anchor>`
#[derive(Args, Debug)]
pub struct RowEdit {
    #[arg(value_parser = parse_name)]
    pub table: String,
    pub index: Index,
    #[arg(value_enum)]
    pub position: PositionArg,
    #[arg(value_parser = parse_name)]
    pub target: String,
    pub anchor: Index,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum PositionArg {
    To,
    Before,
    After,
}

impl From<PositionArg> for Position {
    fn from(p: PositionArg) -> Self {
        match p {
            PositionArg::To => Position::To,
            PositionArg::Before => Position::Before,
            PositionArg::After => Position::After,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum RelationArg {
    At,
    Before,
    After,
    AtOrBefore,
    AtOrAfter,
}

impl From<RelationArg> for IndexRelation {
    fn from(r: RelationArg) -> Self {
        match r {
            RelationArg::At => IndexRelation::At,
            RelationArg::Before => IndexRelation::Before,
            RelationArg::After => IndexRelation::After,
            RelationArg::AtOrBefore => IndexRelation::AtOrBefore,
            RelationArg::AtOrAfter => IndexRelation::AtOrAfter,
        }
    }
}

/// Split a statement into words. Double-quoted words may contain spaces and
/// keep their quotes, so `"a b"` still reads as a JSON string. A `#` that
/// starts a word comments out the rest of the line.
pub fn tokenize(line: &str) -> anyhow::Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
                current.push(c);
            }
            '\\' if quoted => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '#' if !quoted && !in_token => break,
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if quoted {
        anyhow::bail!("unterminated quote");
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn unquote(word: &str) -> Result<String, String> {
    if word.starts_with('"') {
        serde_json::from_str(word).map_err(|e| format!("bad quoted word {word}: {e}"))
    } else {
        Ok(word.to_string())
    }
}

fn parse_name(word: &str) -> Result<String, String> {
    let name = unquote(word)?;
    if name.is_empty() {
        return Err("table name is empty".into());
    }
    Ok(name)
}

/// `A` or `Group/A` for a two-label header.
fn parse_header(word: &str) -> Result<Header, String> {
    let text = unquote(word)?;
    let labels: Vec<&str> = text.split('/').collect();
    if labels.iter().any(|l| l.is_empty()) {
        return Err(format!("empty label in header {text:?}"));
    }
    Ok(Header::new(labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(line: &str) -> Op {
        Statement::try_parse_from(tokenize(line).unwrap()).unwrap().op
    }

    #[test]
    fn parse_run() {
        let cli = Cli::try_parse_from(["tabula", "run", "demo.tab", "--keep-going"]).unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.script, PathBuf::from("demo.tab"));
            assert!(args.keep_going);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_repl_with_config() {
        let cli = Cli::try_parse_from(["tabula", "-v", "repl", "--config", "t.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("t.toml")));
        assert!(matches!(cli.command, Command::Repl(_)));
    }

    #[test]
    fn tokenize_quotes_and_comments() {
        let words = tokenize(r#"set t "First Name" 0 "a \"b\" c"  # trailing"#).unwrap();
        assert_eq!(words, vec!["set", "t", "\"First Name\"", "0", r#""a \"b\" c""#]);
        assert!(tokenize("# only a comment").unwrap().is_empty());
        assert!(tokenize("set t A 0 \"open").is_err());
    }

    #[test]
    fn parse_set_negative_index() {
        match statement("set prices Group/A -3 12.5") {
            Op::Set { table, header, index, value } => {
                assert_eq!(table, "prices");
                assert_eq!(header, Header::new(["Group", "A"]));
                assert_eq!(index, -3);
                assert_eq!(value, "12.5");
            }
            other => panic!("wrong statement {other:?}"),
        }
    }

    #[test]
    fn parse_quoted_header() {
        match statement("get t \"First Name\" 2 --relation at-or-before") {
            Op::Get { header, relation, .. } => {
                assert_eq!(header, Header::from("First Name"));
                assert_eq!(relation, RelationArg::AtOrBefore);
            }
            other => panic!("wrong statement {other:?}"),
        }
    }

    #[test]
    fn parse_column_edit() {
        match statement("move-column t A after t C --as Z") {
            Op::MoveColumn(edit) => {
                assert_eq!(edit.position, PositionArg::After);
                assert_eq!(edit.anchor, Some(Header::from("C")));
                assert_eq!(edit.name, Some(Header::from("Z")));
            }
            other => panic!("wrong statement {other:?}"),
        }
        match statement("copy-column t A to other") {
            Op::CopyColumn(edit) => assert_eq!(edit.anchor, None),
            other => panic!("wrong statement {other:?}"),
        }
    }

    #[test]
    fn parse_row_edit() {
        match statement("copy-row t -1 before u 4") {
            Op::CopyRow(edit) => {
                assert_eq!(edit.index, -1);
                assert_eq!(edit.position, PositionArg::Before);
                assert_eq!(edit.anchor, 4);
            }
            other => panic!("wrong statement {other:?}"),
        }
    }

    #[test]
    fn reject_bad_statements() {
        assert!(Statement::try_parse_from(tokenize("set t A notanumber 1").unwrap()).is_err());
        assert!(Statement::try_parse_from(tokenize("set t A// 0 1").unwrap()).is_err());
        assert!(Statement::try_parse_from(tokenize("frobnicate t").unwrap()).is_err());
    }
}
