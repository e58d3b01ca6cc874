//! `Id3Parser`: consumes the leading bytes of the audio payload, locates and decodes an ID3v2.3
//! header if present, and extracts `TIT2`/`TPE1` into a `StreamTitle = "Performer - Title"`
//! metadata event. Byte-exact semantics (frame layout, synchsafe size encoding, encoding byte
//! values) are grounded on the ID3v2.3 tag format the engine this was modeled on parses.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Id3State {
    Initial,
    ParseFrames,
    TagParsed,
    NotValidTag,
}

/// Streaming ID3v2.3 tag parser. Feed it the first bytes of the audio payload; once it reaches
/// a terminal state (`Tag_Parsed` or `Not_Valid_Tag`) it stops wanting data.
pub struct Id3Parser {
    state: Id3State,
    bytes_received: u32,
    tag_size: u32,
    has_footer: bool,
    uses_extended_header: bool,
    tag_data: Vec<u8>,
    title: Option<String>,
    performer: Option<String>,
}

impl Default for Id3Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Id3Parser {
    pub fn new() -> Self {
        Self {
            state: Id3State::Initial,
            bytes_received: 0,
            tag_size: 0,
            has_footer: false,
            uses_extended_header: false,
            tag_data: Vec::new(),
            title: None,
            performer: None,
        }
    }

    pub fn want_data(&self) -> bool {
        !matches!(self.state, Id3State::TagParsed | Id3State::NotValidTag)
    }

    /// Number of bytes the tag occupies once parsed (for duration math); `0` until then, or if
    /// there was no valid tag.
    pub fn tag_size(&self) -> u32 {
        if self.state == Id3State::TagParsed {
            self.tag_size
        } else {
            0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed more bytes; returns `Some(metadata)` the moment a tag finishes parsing (emitted
    /// exactly once, on the transition into `Tag_Parsed`).
    pub fn feed(&mut self, data: &[u8]) -> Option<BTreeMap<String, String>> {
        if !self.want_data() {
            return None;
        }

        self.bytes_received += data.len() as u32;
        self.tag_data.extend_from_slice(data);

        loop {
            match self.state {
                Id3State::Initial => {
                    if self.bytes_received <= 9 {
                        return None;
                    }
                    if &self.tag_data[0..3] != b"ID3" {
                        self.state = Id3State::NotValidTag;
                        return None;
                    }
                    let major_version = self.tag_data[3];
                    if major_version != 3 {
                        self.state = Id3State::NotValidTag;
                        return None;
                    }

                    let flags = self.tag_data[5];
                    // The original checks these with an if/else-if chain: only one of
                    // unsynchronisation/extended-header/footer is ever recognized per tag.
                    if flags & 0x80 != 0 {
                        // unsynchronisation: not applied to frame content here.
                    } else if flags & 0x40 != 0 {
                        self.uses_extended_header = true;
                    } else if flags & 0x10 != 0 {
                        self.has_footer = true;
                    }

                    let mut tag_size = synchsafe(
                        self.tag_data[6],
                        self.tag_data[7],
                        self.tag_data[8],
                        self.tag_data[9],
                    );

                    if tag_size == 0 {
                        self.state = Id3State::NotValidTag;
                        return None;
                    }

                    if self.has_footer {
                        tag_size += 10;
                    }
                    tag_size += 10;
                    self.tag_size = tag_size;
                    self.state = Id3State::ParseFrames;
                }

                Id3State::ParseFrames => {
                    if (self.tag_data.len() as u32) < self.tag_size {
                        return None;
                    }

                    let mut pos: usize = 10;

                    if self.uses_extended_header {
                        let ext_size = synchsafe(
                            self.tag_data[pos],
                            self.tag_data[pos + 1],
                            self.tag_data[pos + 2],
                            self.tag_data[pos + 3],
                        );
                        if pos as u32 + ext_size > self.tag_size {
                            self.state = Id3State::NotValidTag;
                            return None;
                        }
                        pos += ext_size as usize;
                    }

                    while (pos as u32) < self.tag_size {
                        if pos + 10 > self.tag_data.len() {
                            self.state = Id3State::NotValidTag;
                            return None;
                        }

                        let name = &self.tag_data[pos..pos + 4];
                        pos += 4;

                        let framesize = synchsafe(
                            self.tag_data[pos],
                            self.tag_data[pos + 1],
                            self.tag_data[pos + 2],
                            self.tag_data[pos + 3],
                        );
                        if framesize == 0 {
                            self.state = Id3State::NotValidTag;
                            return None;
                        }
                        // 4 size bytes + 2 flags bytes = 6.
                        pos += 6;

                        let encoding_byte = self.tag_data[pos];
                        let content_start = pos + 1;
                        let content_len = framesize.saturating_sub(1) as usize;
                        let content = &self.tag_data
                            [content_start..(content_start + content_len).min(self.tag_data.len())];

                        let text = decode_id3_text(content, encoding_byte);

                        match name {
                            b"TIT2" => self.title = Some(text),
                            b"TPE1" => self.performer = Some(text),
                            _ => {}
                        }

                        pos += framesize as usize;
                    }

                    self.state = Id3State::TagParsed;

                    let stream_title = match (&self.performer, &self.title) {
                        (Some(p), Some(t)) if !p.is_empty() => format!("{p} - {t}"),
                        (_, Some(t)) => t.clone(),
                        (Some(p), None) => p.clone(),
                        (None, None) => return None,
                    };

                    let mut map = BTreeMap::new();
                    map.insert("StreamTitle".to_string(), stream_title);
                    return Some(map);
                }

                Id3State::TagParsed | Id3State::NotValidTag => return None,
            }
        }
    }
}

fn synchsafe(b6: u8, b7: u8, b8: u8, b9: u8) -> u32 {
    ((b6 as u32) << 21) | ((b7 as u32) << 14) | ((b8 as u32) << 7) | (b9 as u32)
}

/// Decode ID3 frame content per its text-encoding byte: `0=Latin1, 1=UTF16+BOM, 2=UTF16BE,
/// 3=UTF8`. Falls back to a lossy UTF-8 decode for malformed input rather than failing the
/// whole tag parse over one frame.
fn decode_id3_text(bytes: &[u8], encoding_byte: u8) -> String {
    match encoding_byte {
        3 => String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string(),
        1 | 2 => decode_utf16_bytes(bytes, encoding_byte == 1),
        _ => bytes
            .iter()
            .map(|&b| b as char)
            .collect::<String>()
            .trim_end_matches('\0')
            .to_string(),
    }
}

fn decode_utf16_bytes(bytes: &[u8], has_bom: bool) -> String {
    let mut data = bytes;
    let mut big_endian = !has_bom; // UTF16BE (encoding 2) has no BOM and is explicitly BE.

    if has_bom && data.len() >= 2 {
        if data[0] == 0xFE && data[1] == 0xFF {
            big_endian = true;
            data = &data[2..];
        } else if data[0] == 0xFF && data[1] == 0xFE {
            big_endian = false;
            data = &data[2..];
        }
    }

    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    String::from_utf16_lossy(&units)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synchsafe_bytes(size: u32) -> [u8; 4] {
        [
            ((size >> 21) & 0x7F) as u8,
            ((size >> 14) & 0x7F) as u8,
            ((size >> 7) & 0x7F) as u8,
            (size & 0x7F) as u8,
        ]
    }

    fn frame(name: &[u8; 4], encoding: u8, content: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(name);
        let framesize = (content.len() + 1) as u32;
        out.extend_from_slice(&synchsafe_bytes(framesize));
        out.extend_from_slice(&[0, 0]); // flags
        out.push(encoding);
        out.extend_from_slice(content);
        out
    }

    fn build_tag(frames: &[Vec<u8>]) -> Vec<u8> {
        let frames_len: usize = frames.iter().map(|f| f.len()).sum();
        let mut out = Vec::new();
        out.extend_from_slice(b"ID3");
        out.push(3); // major version
        out.push(0); // revision
        out.push(0); // flags
        out.extend_from_slice(&synchsafe_bytes(frames_len as u32));
        for f in frames {
            out.extend_from_slice(f);
        }
        out
    }

    #[test]
    fn rejects_missing_magic() {
        let mut parser = Id3Parser::new();
        let result = parser.feed(b"not an id3 tag at all..");
        assert!(result.is_none());
        assert!(!parser.want_data());
    }

    #[test]
    fn parses_title_and_performer_into_stream_title() {
        let tit2 = frame(b"TIT2", 3, b"Song");
        let tpe1 = frame(b"TPE1", 3, b"Artist");
        let tag = build_tag(&[tpe1, tit2]);

        let mut parser = Id3Parser::new();
        let meta = parser.feed(&tag).expect("tag should parse in one pass");
        assert_eq!(meta.get("StreamTitle").unwrap(), "Artist - Song");
        assert_eq!(parser.tag_size(), tag.len() as u32);
        assert!(!parser.want_data());
    }

    #[test]
    fn waits_for_more_bytes_before_parsing_frames() {
        let tit2 = frame(b"TIT2", 3, b"Song");
        let tag = build_tag(&[tit2]);

        let mut parser = Id3Parser::new();
        assert!(parser.feed(&tag[..15]).is_none());
        assert!(parser.want_data());
        let meta = parser.feed(&tag[15..]).expect("remaining bytes complete the tag");
        assert_eq!(meta.get("StreamTitle").unwrap(), "Song");
    }

    #[test]
    fn rejects_unsupported_major_version() {
        let mut tag = build_tag(&[frame(b"TIT2", 3, b"x")]);
        tag[3] = 4; // ID3v2.4
        let mut parser = Id3Parser::new();
        assert!(parser.feed(&tag).is_none());
        assert!(!parser.want_data());
    }
}
