//! Interactive terminal front end over a single [`Session`].
//!
//! Lines starting with `/` are commands; anything else is a question.
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/load <url> [branch]` | Fetch and index a repository with the current filters |
//! | `/clear` | Reset the conversation to the greeting |
//! | `/history` | Print the transcript |
//! | `/help` | List commands |
//! | `/quit` | Leave |

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::attribution::format_sources;
use crate::models::Role;
use crate::session::{LoadRequest, Session};

const HELP: &str = "\
commands:
  /load <url> [branch]   load a repository
  /clear                 reset the conversation
  /history               show the conversation
  /help                  show this help
  /quit                  exit";

/// Parsed input line.
#[derive(Debug, PartialEq)]
enum Command<'a> {
    Ask(&'a str),
    Load { url: &'a str, branch: Option<&'a str> },
    Clear,
    History,
    Help,
    Quit,
    Empty,
    Unknown(&'a str),
}

fn parse_line(line: &str) -> Command<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Ask(line);
    }
    let mut parts = line.split_whitespace();
    match parts.next().unwrap_or_default() {
        "/load" => match parts.next() {
            Some(url) => Command::Load {
                url,
                branch: parts.next(),
            },
            None => Command::Unknown(line),
        },
        "/clear" => Command::Clear,
        "/history" => Command::History,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Unknown(line),
    }
}

/// Run the loop until `/quit` or end of input.
///
/// `template` carries the filters applied to every `/load`; when its `url`
/// is non-empty the repository is loaded before the first prompt.
pub async fn run_repl<R, W>(
    session: &mut Session,
    template: LoadRequest,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let missing = session.ensure_ready();
    if let Err(e) = missing {
        writeln!(out, "warning: {}", e)?;
    }

    if !template.url.trim().is_empty() {
        load(session, &template, out).await?;
    }

    for turn in session.transcript() {
        writeln!(out, "{}: {}", turn.role.as_str(), turn.content)?;
    }

    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };

        match parse_line(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Unknown(cmd) => writeln!(out, "unknown command: {} (try /help)", cmd)?,
            Command::Clear => {
                session.clear();
                if let Some(turn) = session.transcript().last() {
                    writeln!(out, "{}: {}", turn.role.as_str(), turn.content)?;
                }
            }
            Command::History => {
                for turn in session.transcript() {
                    writeln!(out, "{}: {}", turn.role.as_str(), turn.content)?;
                    if turn.role == Role::Assistant {
                        if let Some(sources) = &turn.sources {
                            write!(out, "{}", format_sources(sources))?;
                        }
                    }
                }
            }
            Command::Load { url, branch } => {
                let request = load_request(&template, url, branch);
                load(session, &request, out).await?;
            }
            Command::Ask(question) => match session.ask(question).await {
                Ok(reply) => {
                    writeln!(out, "assistant: {}", reply.answer)?;
                    if !reply.sources_text.is_empty() {
                        writeln!(out, "sources:")?;
                        write!(out, "{}", reply.sources_text)?;
                    }
                }
                Err(e) => writeln!(out, "error: {}", e)?,
            },
        }
    }

    Ok(())
}

/// `/load` keeps the template's filters, and its branch unless one is given.
fn load_request(template: &LoadRequest, url: &str, branch: Option<&str>) -> LoadRequest {
    LoadRequest {
        url: url.to_string(),
        branch: branch.map(str::to_string).or_else(|| template.branch.clone()),
        ..template.clone()
    }
}

async fn load<W: Write>(session: &mut Session, request: &LoadRequest, out: &mut W) -> Result<()> {
    writeln!(out, "loading {} ...", request.url.trim())?;
    match session.load(request).await {
        Ok(summary) => writeln!(
            out,
            "indexed {}@{}: {} files, {} chunks",
            summary.repo.slug(),
            summary.repo.branch,
            summary.documents,
            summary.chunks
        )?,
        Err(e) => writeln!(out, "error: {}", e)?,
    }
    Ok(())
}
