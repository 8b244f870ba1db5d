//! Interactive console: URL entry, routine approval and the question loop.
//!
//! All terminal I/O lives here; the session actions themselves are in
//! [`crate::session`]. Prompts use `dialoguer`, status lines use `console`
//! styling on stdout while tracing goes to stderr.

use crate::api::{Embed, Generate};
use crate::cli::RunArgs;
use crate::error::ActionError;
use crate::fetch::FetchMode;
use crate::models::ArticleRecord;
use crate::outputs::json;
use crate::session::{CycleOutcome, Scout, SessionState};
use crate::utils::take_chars;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Editor, Input, Select};
use std::error::Error;
use tracing::{error, info, warn};

/// Rows shown after a test run.
const PREVIEW_ROWS: usize = 5;

fn print_success(msg: &str) {
    println!("{}", style(msg).green());
}

fn print_warning(msg: &str) {
    println!("{}", style(msg).yellow());
}

fn print_info(msg: &str) {
    println!("{}", style(msg).cyan());
}

fn print_action_error(err: &ActionError) {
    println!("{} {}", style("✗").red(), style(err).red());
}

/// First few records as display lines.
fn preview(records: &[ArticleRecord], rows: usize) -> Vec<String> {
    records
        .iter()
        .take(rows)
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{:>3}. {}  {}",
                i + 1,
                take_chars(r.title.as_deref().unwrap_or("(untitled)"), 80),
                r.link.as_deref().unwrap_or("(no link)")
            )
        })
        .collect()
}

/// What the user picked at the end of a cycle.
enum Next {
    Ask,
    NewUrl,
    Quit,
}

#[derive(Clone, Copy)]
enum Review {
    Test,
    Edit,
    Regenerate,
    Approve,
    Discard,
}

impl Review {
    const ALL: [Review; 5] = [
        Review::Test,
        Review::Edit,
        Review::Regenerate,
        Review::Approve,
        Review::Discard,
    ];

    fn label(&self, tested: bool) -> &'static str {
        match self {
            Review::Test => "Test-run the routine",
            Review::Edit => "Edit the routine",
            Review::Regenerate => "Regenerate with the model",
            Review::Approve if tested => "Approve and save",
            Review::Approve => "Approve and save (test-run first)",
            Review::Discard => "Discard",
        }
    }
}

/// Position of [`Review::Approve`] in [`Review::ALL`], preselected once a
/// test run produced records.
const APPROVE_INDEX: usize = 3;

/// Drive one interactive session until the user quits.
///
/// The first cycle uses the URL, mode and force flag from the command line;
/// later cycles ask for all three.
pub async fn run_session<G: Generate, E: Embed>(
    scout: &Scout<G, E>,
    args: &RunArgs,
) -> Result<(), Box<dyn Error>> {
    let theme = ColorfulTheme::default();
    let mut state = SessionState::default();
    let mut url = args.url.clone();
    let mut mode = args.mode;
    let mut force = args.force_regenerate;
    let mut first = true;

    loop {
        let target = match url.take() {
            Some(u) => u,
            None => Input::<String>::with_theme(&theme)
                .with_prompt("News front page URL")
                .interact_text()?,
        };
        if !first {
            (mode, force) = pick_fetch_options(&theme, mode)?;
        }
        first = false;

        let ready = match scout.start_cycle(&mut state, target.trim(), mode, force).await {
            Ok(CycleOutcome::Reused { records, indexed }) => {
                print_success(&format!(
                    "Used saved scraper: {records} articles extracted, {indexed} indexed."
                ));
                true
            }
            Ok(CycleOutcome::NeedsApproval) => {
                print_success("Generated a new scraper:");
                review_routine(scout, &mut state, &theme).await?
            }
            Ok(CycleOutcome::SavedRoutineFailed(reason)) => {
                print_warning(&format!("The saved scraper needs attention: {reason}"));
                review_routine(scout, &mut state, &theme).await?
            }
            Ok(CycleOutcome::InferenceFailed) => {
                print_warning("Could not infer a scraper for this page.");
                if mode == FetchMode::Simple {
                    print_info("Try the rendered mode if the page builds its content with JavaScript.");
                }
                false
            }
            Err(e) => {
                print_action_error(&e);
                false
            }
        };

        if ready {
            export_records(&state, args).await;
        }

        let next = if ready { Next::Ask } else { pick_next(&theme, state.knowledge.is_some())? };
        let next = match next {
            Next::Ask => question_loop(scout, &mut state, &theme).await?,
            other => other,
        };

        export_transcript(&state, args).await;
        match next {
            Next::NewUrl => continue,
            Next::Quit | Next::Ask => break,
        }
    }
    Ok(())
}

/// Ask for the fetch mode and whether to ignore a saved scraper.
fn pick_fetch_options(
    theme: &ColorfulTheme,
    current: FetchMode,
) -> Result<(FetchMode, bool), Box<dyn Error>> {
    let modes = [FetchMode::Simple, FetchMode::Rendered];
    let labels = ["simple (plain HTTP)", "rendered (headless browser)"];
    let choice = Select::with_theme(theme)
        .with_prompt("Fetch mode")
        .items(&labels)
        .default(if current == FetchMode::Rendered { 1 } else { 0 })
        .interact()?;
    let force = Confirm::with_theme(theme)
        .with_prompt("Ignore any saved scraper and generate a new one?")
        .default(false)
        .interact()?;
    Ok((modes[choice], force))
}

fn pick_next(theme: &ColorfulTheme, can_ask: bool) -> Result<Next, Box<dyn Error>> {
    let mut items = vec!["Scrape another URL", "Quit"];
    if can_ask {
        items.insert(0, "Ask about these articles");
    }
    let choice = Select::with_theme(theme)
        .with_prompt("What next?")
        .items(&items)
        .default(0)
        .interact()?;
    Ok(match items[choice] {
        "Ask about these articles" => Next::Ask,
        "Scrape another URL" => Next::NewUrl,
        _ => Next::Quit,
    })
}

/// Show the generated routine and loop over test, edit, approve or discard.
/// Returns whether a routine was approved and the knowledge base built.
async fn review_routine<G: Generate, E: Embed>(
    scout: &Scout<G, E>,
    state: &mut SessionState,
    theme: &ColorfulTheme,
) -> Result<bool, Box<dyn Error>> {
    if let Some(routine) = &state.pending_routine {
        println!("{}", style(routine).dim());
    }

    loop {
        let tested = !state.records().is_empty();
        let labels: Vec<&str> = Review::ALL.iter().map(|r| r.label(tested)).collect();
        let choice = Select::with_theme(theme)
            .with_prompt("Review the scraper")
            .items(&labels)
            .default(if tested { APPROVE_INDEX } else { 0 })
            .interact()?;

        match Review::ALL[choice] {
            Review::Test => {
                let Some(routine) = state.pending_routine.clone() else {
                    return Ok(false);
                };
                match scout.test_routine(state, &routine) {
                    Ok(0) => print_warning("The routine ran but found no articles."),
                    Ok(n) => {
                        print_success(&format!("Extracted {n} articles. First rows:"));
                        for line in preview(state.records(), PREVIEW_ROWS) {
                            println!("{line}");
                        }
                    }
                    Err(e) => print_action_error(&e),
                }
            }
            Review::Edit => {
                let current = state.pending_routine.clone().unwrap_or_default();
                let edited = Editor::new().extension(".json").edit(&current)
                    .map_err(|dialoguer::Error::IO(e)| e);
                apply_edit(scout, state, edited);
            }
            Review::Regenerate => match scout.regenerate(state).await {
                Ok(true) => {
                    print_success("Generated a new scraper:");
                    if let Some(routine) = &state.pending_routine {
                        println!("{}", style(routine).dim());
                    }
                }
                Ok(false) => print_warning("Could not infer a scraper; the current one is unchanged."),
                Err(e) => print_action_error(&e),
            },
            Review::Approve => match scout.approve(state).await {
                Ok(indexed) => {
                    print_success(&format!(
                        "Scraper saved to {}. {indexed} articles indexed for questions.",
                        scout.registry.path().display()
                    ));
                    return Ok(true);
                }
                Err(ActionError::Indexing(e)) => {
                    // saved, but nothing to ask against
                    print_warning(&format!("Scraper saved, but indexing failed: {e}"));
                    return Ok(false);
                }
                Err(e) => print_action_error(&e),
            },
            Review::Discard => {
                state.pending_routine = None;
                print_info("Scraper discarded.");
                return Ok(false);
            }
        }
    }
}

/// Take the editor's result into the session. A missing or failing editor
/// is reported and leaves the routine as it was.
fn apply_edit<G: Generate, E: Embed>(
    scout: &Scout<G, E>,
    state: &mut SessionState,
    edited: std::io::Result<Option<String>>,
) {
    match edited {
        Ok(Some(edited)) => {
            scout.edit_pending(state, edited);
            print_info("Routine updated; test-run it before saving.");
        }
        Ok(None) => print_info("Edit aborted; routine unchanged."),
        Err(e) => {
            warn!(error = %e, "Editor failed");
            print_warning(&format!("Could not open an editor ({e}); check $EDITOR."));
        }
    }
}

/// Ask questions until the user leaves with an empty line, `/new` or `/quit`.
async fn question_loop<G: Generate, E: Embed>(
    scout: &Scout<G, E>,
    state: &mut SessionState,
    theme: &ColorfulTheme,
) -> Result<Next, Box<dyn Error>> {
    print_info("Ask about the extracted news. Type /new for another site, /quit or an empty line to leave.");
    loop {
        let question = Input::<String>::with_theme(theme)
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()?;
        let question = question.trim();
        match question {
            "" | "/quit" => return Ok(Next::Quit),
            "/new" => return Ok(Next::NewUrl),
            _ => {}
        }

        match scout.ask(state, question).await {
            Ok(reply) => println!("\n{reply}\n"),
            Err(e) => print_action_error(&e),
        }
    }
}

async fn export_records(state: &SessionState, args: &RunArgs) {
    let (Some(dir), Some(domain)) = (&args.json_output_dir, &state.current_domain) else {
        return;
    };
    match json::write_records(state.records(), dir, domain).await {
        Ok(path) => info!(path = %path.display(), "Exported records"),
        Err(e) => error!(error = %e, "Failed to export records"),
    }
}

async fn export_transcript(state: &SessionState, args: &RunArgs) {
    if state.messages.is_empty() {
        return;
    }
    let (Some(dir), Some(domain)) = (&args.json_output_dir, &state.current_domain) else {
        return;
    };
    match json::write_transcript(&state.messages, dir, domain).await {
        Ok(path) => info!(path = %path.display(), "Exported transcript"),
        Err(e) => error!(error = %e, "Failed to export transcript"),
    }
}
