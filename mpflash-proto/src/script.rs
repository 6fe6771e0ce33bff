//! Python snippets executed on the device in raw mode.

use crate::literal::encode_literal;

/// Unmounts the root filesystem, recreates it as LittleFS v2 and remounts it.
///
/// Relies on the `bdev` global that MicroPython's `_boot.py` leaves behind.
pub const FORMAT_FILESYSTEM: &str = "import os\n\
os.umount('/')\n\
os.VfsLfs2.mkfs(bdev)\n\
os.mount(bdev, '/')\n";

/// `errno.EEXIST` as reported by MicroPython ports.
const EEXIST: u32 = 17;

/// Appends the statement that prints the completion `marker`.
pub fn with_marker(command: &str, marker: &str) -> String {
    format!("{command}\nprint({})\n", str_literal(marker))
}

/// Creates each directory in order. Directories that already exist are
/// skipped; any other failure raises on the device.
///
/// Parents must precede their children in `dirs`.
pub fn make_dirs<S: AsRef<str>>(dirs: &[S]) -> String {
    let mut cmd = String::from("import os\n");
    for dir in dirs {
        let quoted = str_literal(dir.as_ref());
        cmd.push_str(&format!("try:\n    os.mkdir({quoted})\n"));
        cmd.push_str(&format!(
            "except OSError as e:\n    if e.errno != {EEXIST}:\n        raise\n"
        ));
    }
    cmd
}

/// Writes `content` to `path`, replacing any existing file.
pub fn write_file(path: &str, content: &[u8]) -> String {
    format!(
        "f = open({}, 'wb')\nf.write(b'{}')\nf.close()\n",
        str_literal(path),
        encode_literal(content)
    )
}

/// Renders `s` as a double-quoted Python `str` literal.
///
/// Non-ASCII characters pass through unchanged since the device parses its
/// input as UTF-8.
pub fn str_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
