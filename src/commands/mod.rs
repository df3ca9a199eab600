//! Text command tables.
//!
//! Each service owns a [`CommandTable`]: an ordered list of `/keyword`
//! commands with numeric ids and a public/private flag, plus a session cursor
//! used by services that take over the console for several turns (chat).
//!
//! Keywords are matched case-insensitively on the first whitespace-delimited
//! token; the rest of the line, trimmed, is the argument string.
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub keyword: &'static str,
    pub description: &'static str,
    pub id: u8,
    /// Private commands are left out of help text but still run when invoked.
    pub public: bool,
}

/// Current and previous session command ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionCursor {
    pub current: Option<u8>,
    pub previous: Option<u8>,
}

#[derive(Debug, Default)]
pub struct CommandTable {
    commands: Vec<Command>,
    cursor: Mutex<SessionCursor>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style add of a public command.
    pub fn public(mut self, keyword: &'static str, id: u8, description: &'static str) -> Self {
        self.add(Command {
            keyword,
            description,
            id,
            public: true,
        });
        self
    }

    /// Builder-style add of a private command.
    pub fn private(mut self, keyword: &'static str, id: u8, description: &'static str) -> Self {
        self.add(Command {
            keyword,
            description,
            id,
            public: false,
        });
        self
    }

    /// Append a command. A keyword already present in this table is refused.
    pub fn add(&mut self, command: Command) -> bool {
        if self.find(command.keyword).is_some() {
            log::warn!("duplicate keyword {} ignored", command.keyword);
            return false;
        }
        self.commands.push(command);
        true
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn find(&self, keyword: &str) -> Option<&Command> {
        self.commands
            .iter()
            .find(|c| c.keyword.eq_ignore_ascii_case(keyword))
    }

    pub fn find_by_id(&self, id: u8) -> Option<&Command> {
        self.commands.iter().find(|c| c.id == id)
    }

    /// Public commands, one `"<keyword> (<id>) - <description>"` line each.
    pub fn help_text(&self) -> String {
        let mut out = String::new();
        for c in self.commands.iter().filter(|c| c.public) {
            out.push_str(&format!("{} ({}) - {}\n", c.keyword, c.id, c.description));
        }
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionCursor> {
        match self.cursor.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn cursor(&self) -> SessionCursor {
        *self.lock()
    }

    /// Command id currently holding the console, if any.
    pub fn current(&self) -> Option<u8> {
        self.lock().current
    }

    /// Divert input to command `id`; whatever was current becomes previous.
    pub fn enter_session(&self, id: u8) {
        let mut c = self.lock();
        c.previous = c.current;
        c.current = Some(id);
    }

    /// Restore the previous command, normally none.
    pub fn exit_session(&self) {
        let mut c = self.lock();
        c.current = c.previous.take();
    }
}

/// Split a command line into keyword and trimmed argument string.
pub fn split_command(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((kw, rest)) => (kw, rest.trim()),
        None => (line, ""),
    }
}
