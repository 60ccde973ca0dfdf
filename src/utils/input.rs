use std::io::{self, Write};
use std::str::FromStr;

/// Prompts until the line parses as `T`.
pub fn get_input<T: FromStr>(prompt: &str) -> io::Result<T> {
    loop {
        let line = get_line(prompt)?;
        match line.parse() {
            Ok(value) => return Ok(value),
            Err(_) => println!("Please enter a valid value"),
        }
    }
}

/// Reads one trimmed line. End of input is an error.
pub fn get_line(prompt: &str) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
    }
    Ok(input.trim().to_string())
}

/// Like `get_line`, but an empty answer yields `default`.
pub fn get_line_or(prompt: &str, default: &str) -> io::Result<String> {
    let line = get_line(prompt)?;
    Ok(if line.is_empty() { default.to_string() } else { line })
}
