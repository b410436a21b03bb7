use std::{
    io::{self, stdout, Stdout, Write},
    ops::{Deref, DerefMut},
};

use crossterm::{
    queue,
    style::{Print, PrintStyledContent, Stylize},
    terminal::{self, Clear, ClearType},
};

use crate::device_table::{write_buffer, DeviceTable};
use crate::error::LaunchError;
use crate::registry::{Device, DeviceClass, Registry};

const FALLBACK_WIDTH: u16 = 100;
const INFO_TEXT: &str = "(N / lN) connect | (r) refresh | (q) quit";

/// Line-oriented output surface for the menu and prompts.
pub struct Terminal<W: Write> {
    inner: W,
    width: u16,
}

impl Terminal<Stdout> {
    pub fn stdout() -> Self {
        let width = terminal::size().map(|(cols, _)| cols).unwrap_or(FALLBACK_WIDTH);
        Self::new(stdout(), width)
    }
}

impl<W: Write> Terminal<W> {
    pub fn new(inner: W, width: u16) -> Self {
        Self { inner, width }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn render_menu(&mut self, registry: &Registry, refreshing: bool) -> io::Result<()> {
        queue!(self.inner, Print("\n"))?;
        for class in [DeviceClass::Overlay, DeviceClass::Local] {
            let table = DeviceTable::new(registry, class);
            write_buffer(&mut self.inner, &table.to_buffer(self.width))?;
        }
        if refreshing {
            queue!(
                self.inner,
                PrintStyledContent("background refresh running\n".dark_grey())
            )?;
        }
        queue!(self.inner, PrintStyledContent(INFO_TEXT.dark_grey()), Print("\n"))?;
        self.inner.flush()
    }

    /// Redraws a single progress line in place.
    pub fn progress(&mut self, index: usize, total: usize, device: &Device) -> io::Result<()> {
        queue!(
            self.inner,
            Print("\r"),
            Clear(ClearType::CurrentLine),
            PrintStyledContent(format!("[{}/{}]", index + 1, total).cyan()),
            Print(format!(" {} {}", device.name, device.status())),
        )?;
        if index + 1 == total {
            queue!(self.inner, Print("\n"))?;
        }
        self.inner.flush()
    }

    pub fn prompt(&mut self, text: &str) -> io::Result<()> {
        queue!(self.inner, PrintStyledContent(text.bold()))?;
        self.inner.flush()
    }

    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        queue!(self.inner, PrintStyledContent(text.cyan()), Print("\n"))?;
        self.inner.flush()
    }

    pub fn warning(&mut self, text: &str) -> io::Result<()> {
        queue!(self.inner, PrintStyledContent(text.yellow()), Print("\n"))?;
        self.inner.flush()
    }

    pub fn error(&mut self, text: &str) -> io::Result<()> {
        queue!(self.inner, PrintStyledContent(text.red()), Print("\n"))?;
        self.inner.flush()
    }

    pub fn launch_failure(&mut self, err: &LaunchError) -> io::Result<()> {
        self.error(&format!("Connection failed: {err}"))?;
        for hint in err.hints() {
            queue!(self.inner, Print(format!("  - {hint}\n")))?;
        }
        self.inner.flush()
    }
}

impl<W: Write> Deref for Terminal<W> {
    type Target = W;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<W: Write> DerefMut for Terminal<W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
