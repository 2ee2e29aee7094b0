//! # Session Configurator
//!
//! Resolves the output path and interval, shows the settings menu and asks
//! for explicit confirmation before any connection attempt.
//!
//! The menu is a pure state machine: [`step`] maps the current
//! [`MenuState`] plus one line of operator input to the next state and a
//! list of [`Notice`]s. [`Console`] is the thin I/O shell that renders
//! states and feeds it lines.

use crate::error::ConfigurationError;
use stage_config::LoggerConfig;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Positional command-line values, unparsed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionArgs {
    pub output_path: Option<String>,
    pub interval: Option<String>,
}

/// Run parameters as currently chosen by the operator
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDraft {
    pub output_path: PathBuf,
    pub interval: Duration,
}

impl SessionDraft {
    pub fn interval_secs(&self) -> f64 {
        self.interval.as_secs_f64()
    }

    /// Directory the output file lives in
    pub fn directory(&self) -> &Path {
        match self.output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

/// Message for the operator produced by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Warning(String),
    Error(String),
}

/// Writability of the directory for the draft's output path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStatus {
    pub directory: PathBuf,
    pub file_exists: bool,
    pub problem: Option<String>,
}

impl DirectoryStatus {
    pub fn writable(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            file_exists: false,
            problem: None,
        }
    }

    pub fn unwritable(directory: impl Into<PathBuf>, problem: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_exists: false,
            problem: Some(problem.into()),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.problem.is_none()
    }
}

/// Where the operator is in the menu flow
#[derive(Debug, Clone, PartialEq)]
pub enum MenuState {
    Menu(SessionDraft),
    EditingPath(SessionDraft),
    EditingInterval(SessionDraft),
    Confirming(SessionDraft),
}

impl MenuState {
    pub fn draft(&self) -> &SessionDraft {
        match self {
            MenuState::Menu(draft)
            | MenuState::EditingPath(draft)
            | MenuState::EditingInterval(draft)
            | MenuState::Confirming(draft) => draft,
        }
    }
}

/// Result of feeding one line into the menu
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue(MenuState),
    Ready(SessionDraft),
    Abort,
}

/// Parse a positive interval in seconds
pub fn parse_interval(input: &str) -> Result<Duration, ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidInterval {
        input: input.trim().to_string(),
        reason: reason.to_string(),
    };

    let secs: f64 = input
        .trim()
        .parse()
        .map_err(|_| invalid("not a number"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid("interval must be positive"));
    }

    match Duration::try_from_secs_f64(secs) {
        Ok(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(invalid("interval out of range")),
    }
}

/// Initial draft from positional arguments, falling back to configuration
///
/// A bad interval argument is not fatal: it is reported and the configured
/// default is used instead.
pub fn resolve_initial(args: &SessionArgs, config: &LoggerConfig) -> (SessionDraft, Vec<Notice>) {
    let mut notices = Vec::new();

    let output_path = args
        .output_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&config.output.path));

    let default_interval = config.sampling.interval();
    let interval = match args.interval.as_deref() {
        None => default_interval,
        Some(raw) => parse_interval(raw).unwrap_or_else(|e| {
            warn!("{}, using default {:?}", e, default_interval);
            notices.push(Notice::Warning(format!(
                "Invalid interval: {}. Using default: {} seconds",
                raw.trim(),
                default_interval.as_secs_f64()
            )));
            default_interval
        }),
    };

    (
        SessionDraft {
            output_path,
            interval,
        },
        notices,
    )
}

/// Check that the output directory can receive files
///
/// Creates and removes a scoped temporary file in the nearest existing
/// ancestor, so nothing is created for a directory that does not exist yet.
pub fn check_directory(output_path: &Path) -> DirectoryStatus {
    let directory = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_exists = output_path.is_file();

    let existing = directory
        .ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let problem = if !existing.is_dir() {
        Some(format!("{} is not a directory", existing.display()))
    } else {
        tempfile::NamedTempFile::new_in(&existing)
            .and_then(|scratch| scratch.close())
            .err()
            .map(|e| e.to_string())
    };

    debug!(
        "Checked {} (via {}): {:?}",
        directory.display(),
        existing.display(),
        problem
    );

    DirectoryStatus {
        directory,
        file_exists,
        problem,
    }
}

/// Advance the menu by one line of input
pub fn step(state: MenuState, input: &str, directory: &DirectoryStatus) -> (Step, Vec<Notice>) {
    let input = input.trim();

    match state {
        MenuState::Menu(draft) => match input {
            "1" => match &directory.problem {
                None => (Step::Continue(MenuState::Confirming(draft)), vec![]),
                Some(reason) => {
                    let error = ConfigurationError::UnwritableDirectory {
                        path: directory.directory.clone(),
                        reason: reason.clone(),
                    };
                    (
                        Step::Continue(MenuState::Menu(draft)),
                        vec![Notice::Error(format!("Cannot start: {}", error))],
                    )
                }
            },
            "2" => (Step::Continue(MenuState::EditingPath(draft)), vec![]),
            "3" => (Step::Continue(MenuState::EditingInterval(draft)), vec![]),
            "4" => (Step::Abort, vec![Notice::Info("Exiting...".to_string())]),
            _ => (
                Step::Continue(MenuState::Menu(draft)),
                vec![Notice::Error(
                    "Invalid choice! Please enter 1, 2, 3, or 4.".to_string(),
                )],
            ),
        },

        MenuState::EditingPath(mut draft) => {
            if !input.is_empty() {
                draft.output_path = PathBuf::from(input);
            }
            (Step::Continue(MenuState::Menu(draft)), vec![])
        }

        MenuState::EditingInterval(mut draft) => match parse_interval(input) {
            Ok(interval) => {
                draft.interval = interval;
                (Step::Continue(MenuState::Menu(draft)), vec![])
            }
            Err(e) => (
                Step::Continue(MenuState::Menu(draft)),
                vec![Notice::Error(e.to_string())],
            ),
        },

        MenuState::Confirming(draft) => match input.to_lowercase().as_str() {
            "y" | "yes" => (Step::Ready(draft), vec![]),
            "n" | "no" => (Step::Abort, vec![]),
            _ => (
                Step::Continue(MenuState::Confirming(draft)),
                vec![Notice::Warning(
                    "Please enter 'y' for yes or 'n' for no.".to_string(),
                )],
            ),
        },
    }
}

const RULE: &str = "==================================================";

/// Line-oriented front end for [`step`]
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Run the menu against the real filesystem
    pub fn run(
        &mut self,
        draft: SessionDraft,
        notices: Vec<Notice>,
    ) -> io::Result<Option<SessionDraft>> {
        self.run_with(draft, notices, check_directory)
    }

    /// Run the menu; `Ok(None)` means the operator aborted or input ended
    pub fn run_with(
        &mut self,
        draft: SessionDraft,
        notices: Vec<Notice>,
        mut check: impl FnMut(&Path) -> DirectoryStatus,
    ) -> io::Result<Option<SessionDraft>> {
        writeln!(self.output, "=== TEM Stage Position Logger Configuration ===")?;
        writeln!(self.output)?;
        self.show_notices(&notices)?;

        let mut state = MenuState::Menu(draft);
        let mut line = String::new();

        loop {
            let directory = check(&state.draft().output_path);
            self.render(&state, &directory)?;
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(None);
            }

            let entering_confirmation = !matches!(state, MenuState::Confirming(_));
            let (next, notices) = step(state, &line, &directory);
            self.show_notices(&notices)?;

            state = match next {
                Step::Ready(draft) => return Ok(Some(draft)),
                Step::Abort => return Ok(None),
                Step::Continue(next) => next,
            };

            if entering_confirmation && matches!(state, MenuState::Confirming(_)) {
                self.show_instructions()?;
            } else if matches!(state, MenuState::Menu(_)) {
                writeln!(self.output, "\n{}\n", RULE)?;
            }
        }
    }

    fn render(&mut self, state: &MenuState, directory: &DirectoryStatus) -> io::Result<()> {
        let draft = state.draft();
        match state {
            MenuState::Menu(_) => {
                writeln!(self.output, "Current Configuration:")?;
                writeln!(self.output, "  Output file: {}", draft.output_path.display())?;
                writeln!(self.output, "  Output directory: {}", directory.directory.display())?;
                writeln!(
                    self.output,
                    "  Logging interval: {} seconds ({:.1} Hz)",
                    draft.interval_secs(),
                    1.0 / draft.interval_secs()
                )?;
                writeln!(
                    self.output,
                    "  File will be {}",
                    if directory.file_exists {
                        "appended to"
                    } else {
                        "created"
                    }
                )?;
                match &directory.problem {
                    None => writeln!(self.output, "  ✓ Directory is writable")?,
                    Some(reason) => writeln!(self.output, "  ✗ Directory access error: {}", reason)?,
                }
                writeln!(self.output)?;
                writeln!(self.output, "Options:")?;
                writeln!(self.output, "  1. Start logging with these settings")?;
                writeln!(self.output, "  2. Change output file path")?;
                writeln!(self.output, "  3. Change logging interval")?;
                writeln!(self.output, "  4. Exit")?;
                write!(self.output, "\nEnter your choice (1-4): ")
            }
            MenuState::EditingPath(_) => write!(
                self.output,
                "Enter new output file path (current: {}): ",
                draft.output_path.display()
            ),
            MenuState::EditingInterval(_) => write!(
                self.output,
                "Enter new interval in seconds (current: {}): ",
                draft.interval_secs()
            ),
            MenuState::Confirming(_) => write!(
                self.output,
                "\nDo you understand these instructions and want to start logging? (y/n): "
            ),
        }
    }

    fn show_instructions(&mut self) -> io::Result<()> {
        writeln!(self.output, "\n{}", RULE)?;
        writeln!(self.output, "IMPORTANT INSTRUCTIONS:")?;
        writeln!(self.output, "{}", RULE)?;
        writeln!(self.output, "• The logger will run continuously until stopped")?;
        writeln!(self.output, "• To STOP logging safely, press Ctrl+C (NOT the X button)")?;
        writeln!(self.output, "• Pressing Ctrl+C will:")?;
        writeln!(self.output, "  - Stop data collection gracefully")?;
        writeln!(self.output, "  - Close the CSV file properly")?;
        writeln!(self.output, "  - Disconnect from the instrument safely")?;
        writeln!(self.output, "• Do NOT close the terminal window or kill the process")?;
        writeln!(self.output, "• The CSV file will be updated in real-time")?;
        writeln!(self.output, "{}", RULE)
    }

    fn show_notices(&mut self, notices: &[Notice]) -> io::Result<()> {
        for notice in notices {
            match notice {
                Notice::Info(message) => writeln!(self.output, "{}", message)?,
                Notice::Warning(message) => writeln!(self.output, "⚠️ {}", message)?,
                Notice::Error(message) => writeln!(self.output, "✗ {}", message)?,
            }
        }
        Ok(())
    }
}
