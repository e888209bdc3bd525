use bytes::{BufMut, Bytes, BytesMut};

/// Renders one server-sent event frame.
///
/// Fields come in the order `retry`, `id`, `event`, then one `data:` line per
/// line of `message`. Lines may end with `\n`, `\r\n` or `\r`, so `\n\r`
/// is two terminators with an empty line between them. A zero `id` or
/// `retry` is left out.
pub fn format_frame(message: &str, event: Option<&str>, id: u32, retry: u32) -> Bytes {
    let mut frame = BytesMut::with_capacity(message.len() + event.map_or(0, str::len) + 64);

    if retry != 0 {
        frame.put_slice(format!("retry: {retry}\r\n").as_bytes());
    }
    if id != 0 {
        frame.put_slice(format!("id: {id}\r\n").as_bytes());
    }
    if let Some(event) = event {
        frame.put_slice(b"event: ");
        frame.put_slice(event.as_bytes());
        frame.put_slice(b"\r\n");
    }

    for line in data_lines(message) {
        frame.put_slice(b"data: ");
        frame.put_slice(line.as_bytes());
        frame.put_slice(b"\r\n");
    }
    frame.put_slice(b"\r\n");

    frame.freeze()
}

/// Splits on any line terminator. A terminator at the very end does not
/// start another line, an empty message is one empty line.
fn data_lines(message: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = message;

    loop {
        match rest.find(['\r', '\n']) {
            None => {
                lines.push(rest);
                break;
            }
            Some(end) => {
                lines.push(&rest[..end]);
                let terminator = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[end + terminator..];
                if rest.is_empty() {
                    break;
                }
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(message: &str, event: Option<&str>, id: u32, retry: u32) -> String {
        String::from_utf8(format_frame(message, event, id, retry).to_vec()).unwrap()
    }

    #[test]
    fn test_all_fields() {
        assert_eq!(
            frame("a\nb", Some("update"), 5, 3000),
            "retry: 3000\r\nid: 5\r\nevent: update\r\ndata: a\r\ndata: b\r\n\r\n"
        );
    }

    #[test]
    fn test_zero_id_and_retry_are_left_out() {
        assert_eq!(frame("hello", None, 0, 0), "data: hello\r\n\r\n");
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(frame("", None, 0, 0), "data: \r\n\r\n");
    }

    #[test]
    fn test_mixed_terminators() {
        assert_eq!(frame("a\r\nb\rc\nd", None, 0, 0), "data: a\r\ndata: b\r\ndata: c\r\ndata: d\r\n\r\n");
    }

    #[test]
    fn test_trailing_terminator_does_not_add_a_line() {
        assert_eq!(frame("a\r\n", None, 0, 0), "data: a\r\n\r\n");
        assert_eq!(frame("a\n\n", None, 0, 0), "data: a\r\ndata: \r\n\r\n");
    }

    #[test]
    fn test_lf_cr_ends_two_lines() {
        assert_eq!(frame("a\n\rb", None, 0, 0), "data: a\r\ndata: \r\ndata: b\r\n\r\n");
    }

    #[test]
    fn test_id_without_event() {
        assert_eq!(frame("x", None, 7, 0), "id: 7\r\ndata: x\r\n\r\n");
    }
}
