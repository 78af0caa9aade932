/// How an output redirection opens its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// `>`: create the file if needed and truncate it.
    Truncate,
    /// `>>`: create the file if needed and write at its end.
    Append,
}

/// Standard output redirection of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRedirect {
    /// Target path, already trimmed. May be empty when the user wrote a bare `>`.
    pub path: String,
    pub mode: OutputMode,
}

/// One command of a pipeline.
///
/// A line is parsed into a chain of stages linked through [`Stage::next`]; the
/// first stage owns the rest of the chain, so dropping it releases the whole
/// pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    /// Executable token. Empty means the line was a no-op.
    pub program_name: String,
    /// `argv` of the stage. `arguments[0]` is `program_name` unless the stage is empty.
    pub arguments: Vec<String>,
    /// `<` target, already trimmed.
    pub stdin_redirect: Option<String>,
    /// `>` or `>>` target. When both appear on a stage the later one is kept.
    pub stdout_redirect: Option<OutputRedirect>,
    /// Only consulted on the last stage of a chain.
    pub runs_in_background: bool,
    /// The line ended with `?`. Recorded on the first stage.
    pub requests_autocomplete: bool,
    pub next: Option<Box<Stage>>,
}

impl Stage {
    /// Returns true for a stage produced by an empty line.
    pub fn is_noop(&self) -> bool {
        self.program_name.is_empty()
    }

    /// Iterates over the chain in pipeline order, starting with `self`.
    pub fn stages(&self) -> Stages<'_> {
        Stages { next: Some(self) }
    }

    /// Number of stages in the chain.
    pub fn len(&self) -> usize {
        self.stages().count()
    }

    /// Terminal stage of the chain.
    pub fn last(&self) -> &Stage {
        let mut stage = self;
        while let Some(next) = stage.next.as_deref() {
            stage = next;
        }
        stage
    }

    /// Whether the pipeline as a whole was started with a trailing `&`.
    pub fn is_background(&self) -> bool {
        self.last().runs_in_background
    }
}

impl Drop for Stage {
    /// Unlinks the chain one stage at a time, so long pipelines do not drop
    /// recursively.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut stage) = next {
            next = stage.next.take();
        }
    }
}

/// Iterator over the stages of a chain.
pub struct Stages<'a> {
    next: Option<&'a Stage>,
}

impl<'a> Iterator for Stages<'a> {
    type Item = &'a Stage;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next.as_deref();
        Some(current)
    }
}
