use std::{
    fmt::{self, Display, Debug},
    path::{Path, PathBuf},
    process::Command,
    ffi::OsStr,
};

/// Pretty path formatting: replace $HOME with ~, put quotes around if needed.
pub fn path(path: &Path) -> String {
    lazy_static::lazy_static!{
        static ref HOME: Option<PathBuf> = std::env::var_os("HOME").map(PathBuf::from);
    }
    if let Some(home) = (*HOME).as_ref() {
        if let Ok(suffix) = path.strip_prefix(home) {
            let tilde_path = Path::new("~").join(suffix);
            return quote(&tilde_path.to_string_lossy());
        }
    }
    quote(&path.to_string_lossy())
}

fn quote(s: &str) -> String {
    if s.contains(char::is_whitespace) { format!("'{}'", s) } else { s.to_owned() }
}

/// Formats several paths, separated by a comma.
pub fn paths<P: AsRef<Path>>(paths: &[P]) -> String {
    paths.iter().map(|p| path(p.as_ref())).collect::<Vec<_>>().join(", ")
}

/// Converts command into a string, removing quotes if argument has no whitespace.
/// Arguments are written verbatim (without replacing HOME), so that the string can be copied into a shell.
pub fn command(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .map(|s| quote(&s))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats duration as `HH:MM:SS`, prepending number of days if needed.
pub struct Duration(pub std::time::Duration);

impl Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const IN_DAY: u64 = 86400;
        const IN_HOUR: u64 = 3600;
        const IN_MINUTE: u64 = 60;
        let mut seconds = self.0.as_secs();
        let days = seconds / IN_DAY;
        seconds %= IN_DAY;
        if days > 0 {
            write!(f, "{} days ", days)?;
        }
        write!(f, "{:02}:", seconds / IN_HOUR)?;
        seconds %= IN_HOUR;
        write!(f, "{:02}:{:02}", seconds / IN_MINUTE, seconds % IN_MINUTE)
    }
}

impl Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}
