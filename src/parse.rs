//! Psh line parser
//!
//! Turns a raw input line into a [`CommandLine`]: an ordered sequence of
//! pipeline stages plus optional input/output redirection and a background
//! flag. The executor consumes the parsed structure read-only.

use crate::errors::{Error, Result};

/// One program invocation within a pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    /// The program to execute.
    pub program: String,
    /// The arguments to the program.
    pub args: Vec<String>,
}

/// Builds [`Stage`]s.
#[derive(Clone, Debug)]
pub struct StageBuilder {
    program: String,
    args: Vec<String>,
}

impl StageBuilder {
    /// Initializes a new StageBuilder with the given program and no arguments.
    pub fn new(program: &str) -> StageBuilder {
        StageBuilder {
            program: String::from(program),
            args: Vec::new(),
        }
    }

    /// Add an argument to pass to the program.
    pub fn arg(&mut self, arg: &str) -> &mut StageBuilder {
        self.args.push(String::from(arg));
        self
    }

    /// Add arguments to pass to the program.
    pub fn args(&mut self, args: &[&str]) -> &mut StageBuilder {
        self.args.extend(args.iter().map(|x| (*x).to_owned()));
        self
    }

    /// Consumes the builder to build a Stage.
    pub fn build(self) -> Stage {
        Stage {
            program: self.program,
            args: self.args,
        }
    }
}

/// Represents all information associated with a user input line.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandLine {
    /// Original command line text, used for messages and job listings.
    pub input: String,
    /// The pipeline stages to execute, in order.
    pub stages: Vec<Stage>,
    /// The name of the input file, if one is specified.
    pub infile: Option<String>,
    /// The file to write stdout to, if one is specified.
    pub outfile: Option<String>,
    /// Run the command in the background, defaults to false.
    pub background: bool,
}

impl CommandLine {
    /// Parses an input line into a `CommandLine`.
    ///
    /// Returns `Ok(None)` for blank input. Stages are separated by `|`;
    /// `<`/`>` introduce input/output redirection (attached or standalone)
    /// and a token starting with `&` requests background execution.
    ///
    /// # Examples
    ///
    /// ```
    /// use psh_rs::parse::CommandLine;
    ///
    /// let line = CommandLine::parse("echo test").unwrap().unwrap();
    /// assert_eq!(line.input, "echo test");
    /// assert!(line.infile.is_none());
    /// assert!(line.outfile.is_none());
    /// assert!(!line.background);
    /// assert_eq!(line.stages.len(), 1);
    /// assert_eq!(line.stages[0].program, "echo");
    /// assert_eq!(line.stages[0].args, vec!["test".to_string()]);
    /// ```
    pub fn parse(input: &str) -> Result<Option<CommandLine>> {
        let input_trimmed = input.trim();
        if input_trimmed.is_empty() {
            return Ok(None);
        }

        let mut line = CommandLineBuilder::new(input_trimmed);
        for segment in input_trimmed.split('|') {
            let argv: Vec<_> = segment.split_whitespace().collect();
            if argv.is_empty() {
                return Err(Error::syntax(input_trimmed));
            }

            let mut stage = StageBuilder::new(argv[0]);
            let mut infile = false;
            let mut outfile = false;
            for &arg in &argv[1..] {
                if arg.starts_with('<') && !infile {
                    if arg.len() > 1 {
                        line.infile(&arg[1..]);
                    } else {
                        infile = true;
                    }
                } else if infile {
                    line.infile(arg);
                    infile = false;
                } else if arg.starts_with('>') && !outfile {
                    if arg.len() > 1 {
                        line.outfile(&arg[1..]);
                    } else {
                        outfile = true;
                    }
                } else if outfile {
                    line.outfile(arg);
                    outfile = false;
                } else if arg.starts_with('&') {
                    line.background(true);
                } else {
                    stage.arg(arg);
                }
            }
            if infile || outfile {
                return Err(Error::syntax(input_trimmed));
            }
            line.stage(stage.build());
        }

        Ok(Some(line.build()))
    }
}

/// Builds [`CommandLine`]s.
#[derive(Debug)]
pub struct CommandLineBuilder {
    input: String,
    stages: Vec<Stage>,
    infile: Option<String>,
    outfile: Option<String>,
    background: bool,
}

impl CommandLineBuilder {
    /// Constructs a new `CommandLineBuilder` with the following default
    /// configuration:
    ///
    /// * No input/output redirection
    /// * Runs in foreground
    /// * No stages
    ///
    /// Builder methods are provided to change these defaults and otherwise
    /// configure the command line.
    pub fn new(input: &str) -> CommandLineBuilder {
        CommandLineBuilder {
            input: String::from(input),
            stages: Vec::new(),
            infile: None,
            outfile: None,
            background: false,
        }
    }

    /// Add input redirection from the specified filename.
    pub fn infile(&mut self, filename: &str) -> &mut CommandLineBuilder {
        self.infile = Some(String::from(filename));
        self
    }

    /// Add output redirection to the specified filename.
    pub fn outfile(&mut self, filename: &str) -> &mut CommandLineBuilder {
        self.outfile = Some(String::from(filename));
        self
    }

    /// Configure the command line to run in the background.
    pub fn background(&mut self, background: bool) -> &mut CommandLineBuilder {
        self.background = background;
        self
    }

    /// Append a pipeline stage.
    pub fn stage(&mut self, stage: Stage) -> &mut CommandLineBuilder {
        self.stages.push(stage);
        self
    }

    /// Build the final command line.
    pub fn build(self) -> CommandLine {
        CommandLine {
            input: self.input,
            stages: self.stages,
            infile: self.infile,
            outfile: self.outfile,
            background: self.background,
        }
    }
}
