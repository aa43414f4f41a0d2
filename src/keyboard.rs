// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;

use tokio::task::JoinHandle;
use tracing::{info, span, warn, Level};

use crate::engine::SampleEngine;
use crate::notes::{self, NoteName};

/// Plays notes typed on the keyboard, one line at a time.
pub struct Driver {
    engine: SampleEngine,
}

impl Driver {
    pub fn new(engine: SampleEngine) -> Driver {
        Driver { engine }
    }

    /// Reads one line and reports a note for every mapped key on it. Returns
    /// false once the reader is exhausted.
    fn monitor_io<R, W, F>(mut reader: R, mut writer: W, mut on_note: F) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
        F: FnMut(NoteName),
    {
        write!(writer, "Keys (")?;
        for (i, note) in NoteName::ALL.iter().enumerate() {
            if i > 0 {
                write!(writer, " ")?;
            }
            write!(writer, "{}={}", note.key(), note)?;
        }
        write!(writer, "): ")?;
        writer.flush()?;

        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        for key in input.trim().chars().filter(|key| !key.is_whitespace()) {
            match notes::note_for_key(key) {
                Some(note) => on_note(note),
                None => warn!(key = %key, "Unmapped key"),
            }
        }
        Ok(true)
    }

    /// Monitors stdin until it closes, playing every mapped key.
    pub fn monitor(self) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(io::stdin().lock(), io::stdout(), |note| {
                self.engine.play(note.as_str())
            })? {}

            info!("Keyboard input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader};

    use super::{Driver, NoteName};

    fn get_notes(input: &str) -> Result<(bool, Vec<NoteName>, String), io::Error> {
        let reader = BufReader::new(input.as_bytes());
        let mut writer: Vec<u8> = Vec::new();
        let mut notes = Vec::new();
        let more = Driver::monitor_io(reader, &mut writer, |note| notes.push(note))?;
        Ok((more, notes, String::from_utf8_lossy(&writer).to_string()))
    }

    #[test]
    fn test_keyboard_notes() -> Result<(), io::Error> {
        let (more, notes, prompt) = get_notes("asdfghjk\n")?;
        assert!(more);
        assert_eq!(notes, NoteName::ALL.to_vec());
        assert_eq!(
            prompt,
            "Keys (a=C s=D d=E f=F g=G h=A j=B k=C2): "
        );

        let (_, notes, _) = get_notes("G a\n")?;
        assert_eq!(notes, vec![NoteName::G, NoteName::C]);

        let (more, notes, _) = get_notes("zxq\n")?;
        assert!(more);
        assert!(notes.is_empty());
        Ok(())
    }

    #[test]
    fn test_keyboard_eof() -> Result<(), io::Error> {
        let (more, notes, _) = get_notes("")?;
        assert!(!more);
        assert!(notes.is_empty());
        Ok(())
    }
}
