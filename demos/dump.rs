// nrbf-remoting - MS-NRBF serialization and a .NET Remoting TCP channel.
// Copyright (C) 2026  nrbf-remoting contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Decodes an NRBF message from a file (raw bytes, or hex with `--hex`)
//! and prints it as JSON.

use nrbf_remoting::inspect::message_to_json;
use std::env;
use std::fs;
use std::io::Cursor;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let (path, as_hex) = match args.as_slice() {
        [_, flag, path] if flag == "--hex" => (path, true),
        [_, path] => (path, false),
        _ => {
            eprintln!("Usage: {} [--hex] <nrbf_file>", args[0]);
            std::process::exit(1);
        }
    };

    let bytes = if as_hex {
        let text: String = fs::read_to_string(path)?.split_whitespace().collect();
        hex::decode(text)?
    } else {
        fs::read(path)?
    };

    let (message, _context) = nrbf_remoting::parse(Cursor::new(bytes))?;
    println!("{}", serde_json::to_string_pretty(&message_to_json(&message))?);
    Ok(())
}
