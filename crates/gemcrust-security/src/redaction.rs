use std::sync::LazyLock;

use regex::Regex;
use tracing_subscriber::fmt::MakeWriter;

/// A writer that masks bot tokens and API keys before log lines hit stderr.
pub struct RedactingWriter<W> {
    inner: W,
}

impl RedactingWriter<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self {
            inner: std::io::stderr(),
        }
    }
}

impl<W: std::io::Write> std::io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let original = String::from_utf8_lossy(buf);
        let redacted = redact_secrets(&original);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for RedactingWriter<std::io::Stderr> {
    type Writer = RedactingWriter<std::io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: std::io::stderr(),
        }
    }
}

static SECRET_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
          \d{6,12}:[A-Za-z0-9_\-]{30,}   # Telegram bot tokens
        | AIza[0-9A-Za-z_\-]{30,}         # Google API keys
        ",
    )
    .expect("redaction regex should compile")
});

static KEY_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([?&]key=)[^&\s]+").expect("key param regex should compile")
});

/// Replace known secret patterns with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    let masked = SECRET_PATTERNS.replace_all(input, "[REDACTED]");
    KEY_PARAM.replace_all(&masked, "${1}[REDACTED]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn redacts_telegram_bot_token() {
        let input = "GET https://api.telegram.org/bot123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw/getMe";
        assert_eq!(
            redact_secrets(input),
            "GET https://api.telegram.org/bot[REDACTED]/getMe"
        );
    }

    #[test]
    fn redacts_google_api_key() {
        let input = "key AIzaSyA1234567890abcdefghijklmnopqrstu";
        assert_eq!(redact_secrets(input), "key [REDACTED]");
    }

    #[test]
    fn redacts_key_query_param() {
        let input = "POST /v1beta/models/x:streamGenerateContent?alt=sse&key=short-secret";
        assert_eq!(
            redact_secrets(input),
            "POST /v1beta/models/x:streamGenerateContent?alt=sse&key=[REDACTED]"
        );
    }

    #[test]
    fn leaves_normal_text_unchanged() {
        let input = "chat 12345: session cleared at 10:30";
        assert_eq!(redact_secrets(input), input);
    }

    #[test]
    fn writer_reports_original_length() {
        let mut writer = RedactingWriter { inner: Vec::new() };
        let line = b"token 123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw\n";
        let written = writer.write(line).expect("write");
        assert_eq!(written, line.len());
        assert_eq!(
            String::from_utf8(writer.inner).unwrap(),
            "token [REDACTED]\n"
        );
    }
}
