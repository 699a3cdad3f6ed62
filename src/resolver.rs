//! App Resolver: free-text identifier -> exactly one resolution outcome
//!
//! Each input is searched; zero matches is `NotFound`, one match is
//! `Resolved`, several matches is `Ambiguous`. In interactive runs a
//! [`Disambiguator`] is consulted on zero or several matches and may pick an
//! app, supply a new search term, or give up. That loop is driven by the
//! operator and has no iteration cap. Non-interactive runs perform exactly
//! one search per input and never consult the disambiguator.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use std::fmt;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::AppRecord;
use crate::sanitize::sanitize_column;
use crate::search::AppSearchEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResolutionStatus {
    Resolved,
    Ambiguous,
    NotFound,
}

impl ResolutionStatus {
    pub const ALL: [ResolutionStatus; 3] = [Self::Resolved, Self::Ambiguous, Self::NotFound];
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolved => "RESOLVED",
            Self::Ambiguous => "AMBIGUOUS",
            Self::NotFound => "NOT_FOUND",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Resolved(AppRecord),
    Ambiguous { match_count: usize },
    NotFound,
}

/// Result of resolving one input line
///
/// Only the attached metadata (a value to apply later) can change after
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct AppResolution {
    input: String,
    outcome: Outcome,
    metadata: Option<String>,
}

impl AppResolution {
    pub fn resolved(input: &str, app: AppRecord) -> Self {
        Self::with_outcome(input, Outcome::Resolved(app))
    }

    pub fn ambiguous(input: &str, match_count: usize) -> Self {
        Self::with_outcome(input, Outcome::Ambiguous { match_count })
    }

    pub fn not_found(input: &str) -> Self {
        Self::with_outcome(input, Outcome::NotFound)
    }

    fn with_outcome(input: &str, outcome: Outcome) -> Self {
        Self {
            input: input.to_string(),
            outcome,
            metadata: None,
        }
    }

    pub fn status(&self) -> ResolutionStatus {
        match self.outcome {
            Outcome::Resolved(_) => ResolutionStatus::Resolved,
            Outcome::Ambiguous { .. } => ResolutionStatus::Ambiguous,
            Outcome::NotFound => ResolutionStatus::NotFound,
        }
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn app(&self) -> Option<&AppRecord> {
        match &self.outcome {
            Outcome::Resolved(app) => Some(app),
            _ => None,
        }
    }

    pub fn ambiguous_count(&self) -> Option<usize> {
        match self.outcome {
            Outcome::Ambiguous { match_count } => Some(match_count),
            _ => None,
        }
    }

    pub fn attach_metadata(&mut self, value: impl Into<String>) {
        self.metadata = Some(value.into());
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    /// The app's display name when resolved, otherwise the original input
    pub fn display_name(&self) -> String {
        match &self.outcome {
            Outcome::Resolved(app) => app.display_name(),
            _ => sanitize_column(&self.input),
        }
    }

    /// One report line: `id, name[, value]`, `name: count`, or `name`.
    pub fn render(&self) -> String {
        match &self.outcome {
            Outcome::Resolved(app) => {
                let base = format!("{}, {}", app.id, self.display_name());
                match &self.metadata {
                    Some(value) => format!("{}, {}", base, sanitize_column(value)),
                    None => base,
                }
            }
            Outcome::Ambiguous { match_count } => format!("{}: {}", self.display_name(), match_count),
            Outcome::NotFound => self.display_name(),
        }
    }
}

/// Operator decision when a search matched nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundChoice {
    Retry(String),
    GiveUp,
}

/// Operator decision when a search matched several apps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmbiguousChoice {
    /// 1-based position in the list of matches
    Select(usize),
    Retry(String),
    Skip,
}

/// How zero or multiple matches are settled
pub trait Disambiguator {
    /// Fixed for the whole run. When false, the resolver never calls the
    /// other methods.
    fn is_interactive(&self) -> bool;

    fn on_not_found(&mut self, term: &str) -> Result<NotFoundChoice>;

    fn on_ambiguous(&mut self, term: &str, matches: &[AppRecord]) -> Result<AmbiguousChoice>;

    /// Asks before a single write. Non-interactive runs always proceed.
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

impl<D: Disambiguator + ?Sized> Disambiguator for &mut D {
    fn is_interactive(&self) -> bool {
        (**self).is_interactive()
    }

    fn on_not_found(&mut self, term: &str) -> Result<NotFoundChoice> {
        (**self).on_not_found(term)
    }

    fn on_ambiguous(&mut self, term: &str, matches: &[AppRecord]) -> Result<AmbiguousChoice> {
        (**self).on_ambiguous(term, matches)
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        (**self).confirm(prompt)
    }
}

impl<D: Disambiguator + ?Sized> Disambiguator for Box<D> {
    fn is_interactive(&self) -> bool {
        (**self).is_interactive()
    }

    fn on_not_found(&mut self, term: &str) -> Result<NotFoundChoice> {
        (**self).on_not_found(term)
    }

    fn on_ambiguous(&mut self, term: &str, matches: &[AppRecord]) -> Result<AmbiguousChoice> {
        (**self).on_ambiguous(term, matches)
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        (**self).confirm(prompt)
    }
}

/// Batch mode: nothing found stays not found, several matches stay ambiguous
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Disambiguator for NonInteractive {
    fn is_interactive(&self) -> bool {
        false
    }

    fn on_not_found(&mut self, _term: &str) -> Result<NotFoundChoice> {
        Ok(NotFoundChoice::GiveUp)
    }

    fn on_ambiguous(&mut self, _term: &str, _matches: &[AppRecord]) -> Result<AmbiguousChoice> {
        Ok(AmbiguousChoice::Skip)
    }
}

/// Terminal prompts; blocks until the operator answers
pub struct ConsolePrompt {
    theme: ColorfulTheme,
}

impl Default for ConsolePrompt {
    fn default() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl ConsolePrompt {
    fn ask_term(&self, term: &str) -> Result<String> {
        Ok(Input::<String>::with_theme(&self.theme)
            .with_prompt(format!("Please enter new search for {term}"))
            .interact_text()?)
    }
}

/// One entry per match, then the retry and skip options
fn ambiguous_menu(matches: &[AppRecord]) -> Vec<String> {
    let mut items: Vec<String> = matches.iter().map(AppRecord::summary).collect();
    items.push("Re-enter search term".to_string());
    items.push("Skip".to_string());
    items
}

impl Disambiguator for ConsolePrompt {
    fn is_interactive(&self) -> bool {
        true
    }

    fn on_not_found(&mut self, term: &str) -> Result<NotFoundChoice> {
        let again = Confirm::with_theme(&self.theme)
            .with_prompt(format!("Unable to find app {term}, would you like to enter a new search?"))
            .default(false)
            .interact()?;
        if again {
            Ok(NotFoundChoice::Retry(self.ask_term(term)?))
        } else {
            Ok(NotFoundChoice::GiveUp)
        }
    }

    fn on_ambiguous(&mut self, term: &str, matches: &[AppRecord]) -> Result<AmbiguousChoice> {
        let items = ambiguous_menu(matches);
        let retry = matches.len();

        let selection = Select::with_theme(&self.theme)
            .with_prompt(format!("Found ambiguous app name {term}, which app did you mean?"))
            .items(&items)
            .default(0)
            .interact()?;

        Ok(match selection {
            i if i < retry => AmbiguousChoice::Select(i + 1),
            i if i == retry => AmbiguousChoice::Retry(self.ask_term(term)?),
            _ => AmbiguousChoice::Skip,
        })
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(true)
            .interact()?)
    }
}

pub struct AppResolver<'a, D> {
    engine: AppSearchEngine<'a>,
    disambiguator: D,
}

impl<'a, D: Disambiguator> AppResolver<'a, D> {
    pub fn new(engine: AppSearchEngine<'a>, disambiguator: D) -> Self {
        Self { engine, disambiguator }
    }

    pub fn engine(&self) -> &AppSearchEngine<'a> {
        &self.engine
    }

    pub fn disambiguator(&self) -> &D {
        &self.disambiguator
    }

    pub fn is_interactive(&self) -> bool {
        self.disambiguator.is_interactive()
    }

    /// Resolves one free-text identifier (name or URL) to an outcome.
    ///
    /// Search and transport failures are returned as errors; everything
    /// else, including ambiguity, is a resolution.
    pub async fn resolve(&mut self, input: &str) -> Result<AppResolution> {
        let interactive = self.disambiguator.is_interactive();
        let mut term = input.trim().to_string();

        loop {
            let mut apps = self.engine.find_app(&term).await?;
            debug!("{:?} matched {} apps", term, apps.len());

            match apps.len() {
                0 if !interactive => return Ok(AppResolution::not_found(input)),
                0 => match self.disambiguator.on_not_found(&term)? {
                    NotFoundChoice::Retry(next) if !next.trim().is_empty() => term = next.trim().to_string(),
                    _ => return Ok(AppResolution::not_found(input)),
                },
                1 => return Ok(AppResolution::resolved(input, apps.remove(0))),
                n if !interactive => return Ok(AppResolution::ambiguous(input, n)),
                n => loop {
                    match self.disambiguator.on_ambiguous(&term, &apps)? {
                        AmbiguousChoice::Select(i) if (1..=n).contains(&i) => {
                            return Ok(AppResolution::resolved(input, apps.swap_remove(i - 1)));
                        }
                        AmbiguousChoice::Select(i) => {
                            warn!("Option {} is outside 1..={}, asking again", i, n);
                        }
                        AmbiguousChoice::Retry(next) if !next.trim().is_empty() => {
                            term = next.trim().to_string();
                            break;
                        }
                        AmbiguousChoice::Retry(_) | AmbiguousChoice::Skip => {
                            return Ok(AppResolution::ambiguous(input, n));
                        }
                    }
                },
            }
        }
    }
}
