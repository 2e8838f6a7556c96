//! Interactive prompts
//!
//! Every prompt loops until it gets an acceptable answer. Running out of
//! input is reported as `UnexpectedEof` instead of ending the process.

use std::io::{self, BufRead, StdinLock, Stdout, Write};

use crate::builder::ConnectionInput;
use crate::models::{PipeDraft, StationId};

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{message}")
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim().to_string())
    }

    pub fn positive_int(&mut self, prompt: &str) -> io::Result<i64> {
        loop {
            match self.read_line(prompt)?.parse::<i64>() {
                Ok(v) if v > 0 => return Ok(v),
                _ => self.say("Error: enter a positive integer.")?,
            }
        }
    }

    pub fn positive_f64(&mut self, prompt: &str) -> io::Result<f64> {
        loop {
            match self.read_line(prompt)?.parse::<f64>() {
                Ok(v) if v > 0.0 && v.is_finite() => return Ok(v),
                _ => self.say("Error: enter a positive number.")?,
            }
        }
    }

    pub fn int_in_range(&mut self, prompt: &str, min: i64, max: i64) -> io::Result<i64> {
        loop {
            match self.read_line(prompt)?.parse::<i64>() {
                Ok(v) if (min..=max).contains(&v) => return Ok(v),
                _ => self.say(&format!("Error: enter an integer from {min} to {max}."))?,
            }
        }
    }

    /// A 1/0 answer
    pub fn yes_no(&mut self, prompt: &str) -> io::Result<bool> {
        Ok(self.int_in_range(prompt, 0, 1)? == 1)
    }

    /// A non-empty line usable as a record field (no `|`)
    pub fn field(&mut self, prompt: &str) -> io::Result<String> {
        loop {
            let line = self.read_line(prompt)?;
            if line.is_empty() {
                self.say("The value must not be empty.")?;
            } else if line.contains('|') {
                self.say("The value must not contain '|'.")?;
            } else {
                return Ok(line);
            }
        }
    }

    /// Attributes of a new pipe, asking only for what is missing
    pub fn pipe_draft(
        &mut self,
        name: Option<String>,
        length_km: Option<f64>,
        in_repair: Option<bool>,
    ) -> io::Result<PipeDraft> {
        let name = match name {
            Some(name) => name,
            None => self.field("Pipe name: ")?,
        };
        let length_km = match length_km {
            Some(length) => length,
            None => self.positive_f64("Length (km): ")?,
        };
        let in_repair = match in_repair {
            Some(flag) => flag,
            None => self.yes_no("Pipe in repair? (1 - yes, 0 - no): ")?,
        };
        Ok(PipeDraft {
            name,
            length_km,
            in_repair,
        })
    }

    /// Working workshop count, re-asked while it exceeds `total`
    pub fn working_workshops(&mut self, total: i64) -> io::Result<i64> {
        self.int_in_range("Working workshops: ", 0, total)
    }
}

/// Answers already given on the command line for `connect`
#[derive(Debug, Default, Clone)]
pub struct ConnectAnswers {
    pub diameter: Option<i64>,
    pub from: Option<StationId>,
    pub to: Option<StationId>,
    pub pipe_name: Option<String>,
    pub pipe_length_km: Option<f64>,
    pub pipe_in_repair: Option<bool>,
}

/// Feeds the connection builder from command-line answers, prompting for the rest
pub struct PromptedConnection<'a, R, W> {
    answers: ConnectAnswers,
    prompter: &'a mut Prompter<R, W>,
}

impl<'a, R: BufRead, W: Write> PromptedConnection<'a, R, W> {
    pub fn new(answers: ConnectAnswers, prompter: &'a mut Prompter<R, W>) -> Self {
        Self { answers, prompter }
    }
}

impl<R: BufRead, W: Write> ConnectionInput for PromptedConnection<'_, R, W> {
    fn diameter(&mut self) -> io::Result<i64> {
        match self.answers.diameter.take() {
            Some(d) => Ok(d),
            None => {
                self.prompter.say("Allowed diameters: 500, 700, 1000, 1400 mm")?;
                self.prompter.positive_int("Pipe diameter (mm): ")
            }
        }
    }

    fn new_pipe(&mut self, diameter: i64) -> io::Result<PipeDraft> {
        self.prompter
            .say(&format!("No free {diameter} mm pipe found; describing a new one."))?;
        self.prompter.pipe_draft(
            self.answers.pipe_name.take(),
            self.answers.pipe_length_km.take(),
            self.answers.pipe_in_repair.take(),
        )
    }

    fn source_station(&mut self) -> io::Result<StationId> {
        match self.answers.from.take() {
            Some(id) => Ok(id),
            None => self.prompter.positive_int("Source station ID: "),
        }
    }

    fn destination_station(&mut self) -> io::Result<StationId> {
        match self.answers.to.take() {
            Some(id) => Ok(id),
            None => self.prompter.positive_int("Destination station ID: "),
        }
    }
}
