//! Line-based prompts

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, BufRead, IsTerminal, Write};

use crate::error::CliError;

pub type PromptResult<T> = std::result::Result<T, CliError>;

/// Source of answers for the wizard
pub trait Prompter {
    /// Ask until the answer is one of `choices`; empty input picks `default`
    fn choose(&mut self, question: &str, choices: &[&str], default: &str) -> PromptResult<String>;

    fn confirm(&mut self, question: &str, default: bool) -> PromptResult<bool>;

    /// Read a secret without echoing it where the terminal allows
    fn secret(&mut self, question: &str) -> PromptResult<String>;
}

/// Prompts on a writer and reads answers line by line
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
    hide_secrets: bool,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            hide_secrets: false,
        }
    }

    /// End of input means the user walked away
    fn read_line(&mut self) -> PromptResult<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(CliError::Cancelled);
        }
        Ok(line.trim().to_string())
    }
}

impl LinePrompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        let stdin = io::stdin();
        let hide_secrets = stdin.is_terminal();
        Self {
            input: stdin.lock(),
            output: io::stdout(),
            hide_secrets,
        }
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn choose(&mut self, question: &str, choices: &[&str], default: &str) -> PromptResult<String> {
        loop {
            write!(
                self.output,
                "{} [{}] ({}): ",
                question,
                choices.join("/"),
                default
            )?;
            self.output.flush()?;

            let answer = self.read_line()?;
            if answer.is_empty() {
                return Ok(default.to_string());
            }
            if choices.contains(&answer.as_str()) {
                return Ok(answer);
            }
            writeln!(self.output, "Please select one of the available options")?;
        }
    }

    fn confirm(&mut self, question: &str, default: bool) -> PromptResult<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            write!(self.output, "{} [{}]: ", question, hint)?;
            self.output.flush()?;

            match self.read_line()?.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(self.output, "Please enter Y or N")?,
            }
        }
    }

    fn secret(&mut self, question: &str) -> PromptResult<String> {
        write!(self.output, "{}: ", question)?;
        self.output.flush()?;

        let answer = if self.hide_secrets {
            read_hidden()
        } else {
            self.read_line()
        };
        writeln!(self.output)?;
        answer
    }
}

/// Read one line from the terminal in raw mode, so nothing is echoed
fn read_hidden() -> PromptResult<String> {
    let raw = RawMode::enable()?;
    let answer = read_secret_keys();
    raw.disable()?;
    answer
}

fn read_secret_keys() -> PromptResult<String> {
    let mut secret = String::new();
    loop {
        if let Event::Key(key) = event::read()? {
            match secret_key(&mut secret, key) {
                SecretKey::Continue => {}
                SecretKey::Done => return Ok(secret.trim().to_string()),
                SecretKey::Cancel => return Err(CliError::Cancelled),
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SecretKey {
    Continue,
    Done,
    Cancel,
}

/// Apply one key press to the secret being typed. Raw mode swallows SIGINT,
/// so Ctrl-C arrives here as a key.
fn secret_key(secret: &mut String, key: KeyEvent) -> SecretKey {
    if key.kind != KeyEventKind::Press {
        return SecretKey::Continue;
    }
    match key.code {
        KeyCode::Enter => SecretKey::Done,
        KeyCode::Esc => SecretKey::Cancel,
        KeyCode::Char('c') | KeyCode::Char('d')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            SecretKey::Cancel
        }
        KeyCode::Backspace => {
            secret.pop();
            SecretKey::Continue
        }
        KeyCode::Char(c) => {
            secret.push(c);
            SecretKey::Continue
        }
        _ => SecretKey::Continue,
    }
}

/// Raw terminal mode, left again by `disable` or on drop
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }

    fn disable(self) -> io::Result<()> {
        std::mem::forget(self);
        terminal::disable_raw_mode()
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Non-interactive answers for `--yes`: defaults for menus, yes to every
/// confirmation, and no secrets.
pub struct AutoPrompter;

impl Prompter for AutoPrompter {
    fn choose(&mut self, _question: &str, _choices: &[&str], default: &str) -> PromptResult<String> {
        Ok(default.to_string())
    }

    fn confirm(&mut self, _question: &str, _default: bool) -> PromptResult<bool> {
        Ok(true)
    }

    fn secret(&mut self, _question: &str) -> PromptResult<String> {
        Ok(String::new())
    }
}
