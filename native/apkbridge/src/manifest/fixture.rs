//! Minimal binary XML writer for manifest fixtures. Real aapt2 output lives in `assets/testdata`.

use super::ATTR_NAME_RESOURCE_ID;

const NO_INDEX: u32 = 0xFFFF_FFFF;
const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

#[derive(Debug, Default)]
pub(crate) struct AxmlBuilder {
    strings: Vec<String>,
    resource_ids: Vec<u32>,
    utf8: bool,
    body: Vec<u8>,
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn pad_to_four(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

impl AxmlBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Encode the string pool as UTF-8 instead of UTF-16.
    pub(crate) fn utf8(&mut self) -> &mut Self {
        self.utf8 = true;
        self
    }

    /// Reserve pool slot 0 as a blank string mapped to `android:name` through the resource map,
    /// the way shrinkers strip attribute names. Attributes named `""` then resolve to `name`.
    pub(crate) fn obfuscated_name_attribute(&mut self) -> &mut Self {
        assert!(self.strings.is_empty(), "must be called before anything is interned");
        self.intern("");
        self.resource_ids.push(ATTR_NAME_RESOURCE_ID);
        self
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(i) = self.strings.iter().position(|e| e == s) {
            return i as u32;
        }
        self.strings.push(s.to_string());
        (self.strings.len() - 1) as u32
    }

    fn start_chunk(&mut self, name: u32, attributes: &[(u32, u32)]) {
        let chunk = &mut self.body;
        put_u16(chunk, 0x0102);
        put_u16(chunk, 16);
        put_u32(chunk, 16 + 20 + 20 * attributes.len() as u32);
        put_u32(chunk, 1); // line
        put_u32(chunk, NO_INDEX); // comment
        put_u32(chunk, NO_INDEX); // namespace
        put_u32(chunk, name);
        put_u16(chunk, 20); // attribute start
        put_u16(chunk, 20); // attribute size
        put_u16(chunk, attributes.len() as u16);
        put_u16(chunk, 0); // id index
        put_u16(chunk, 0); // class index
        put_u16(chunk, 0); // style index
        for &(attr_name, value) in attributes {
            put_u32(chunk, NO_INDEX);
            put_u32(chunk, attr_name);
            put_u32(chunk, value);
            put_u16(chunk, 8);
            chunk.push(0);
            chunk.push(0x03);
            put_u32(chunk, value);
        }
    }

    pub(crate) fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> &mut Self {
        let name = self.intern(name);
        let attributes: Vec<(u32, u32)> =
            attributes.iter().map(|(k, v)| (self.intern(k), self.intern(v))).collect();
        self.start_chunk(name, &attributes);
        self
    }

    /// Start element whose single attribute points at an arbitrary pool index.
    pub(crate) fn start_with_raw_value(&mut self, name: &str, attr: &str, raw: u32) -> &mut Self {
        let name = self.intern(name);
        let attr = self.intern(attr);
        self.start_chunk(name, &[(attr, raw)]);
        self
    }

    pub(crate) fn end(&mut self, name: &str) -> &mut Self {
        let name = self.intern(name);
        let chunk = &mut self.body;
        put_u16(chunk, 0x0103);
        put_u16(chunk, 16);
        put_u32(chunk, 24);
        put_u32(chunk, 1);
        put_u32(chunk, NO_INDEX);
        put_u32(chunk, NO_INDEX);
        put_u32(chunk, name);
        self
    }

    fn namespace_chunk(chunk_type: u16, prefix: u32, uri: u32) -> Vec<u8> {
        let mut chunk = Vec::new();
        put_u16(&mut chunk, chunk_type);
        put_u16(&mut chunk, 16);
        put_u32(&mut chunk, 24);
        put_u32(&mut chunk, 1);
        put_u32(&mut chunk, NO_INDEX);
        put_u32(&mut chunk, prefix);
        put_u32(&mut chunk, uri);
        chunk
    }

    fn string_pool(&self) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            offsets.push(data.len() as u32);
            if self.utf8 {
                let chars = s.chars().count();
                assert!(chars < 0x80 && s.len() < 0x80, "fixture strings are short");
                data.push(chars as u8);
                data.push(s.len() as u8);
                data.extend_from_slice(s.as_bytes());
                data.push(0);
            } else {
                let units: Vec<u16> = s.encode_utf16().collect();
                put_u16(&mut data, units.len() as u16);
                for unit in units {
                    put_u16(&mut data, unit);
                }
                put_u16(&mut data, 0);
            }
        }
        pad_to_four(&mut data);

        let count = self.strings.len() as u32;
        let mut chunk = Vec::new();
        put_u16(&mut chunk, 0x0001);
        put_u16(&mut chunk, 28);
        put_u32(&mut chunk, 28 + 4 * count + data.len() as u32);
        put_u32(&mut chunk, count);
        put_u32(&mut chunk, 0); // styles
        put_u32(&mut chunk, if self.utf8 { 1 << 8 } else { 0 });
        put_u32(&mut chunk, 28 + 4 * count);
        put_u32(&mut chunk, 0);
        for offset in offsets {
            put_u32(&mut chunk, offset);
        }
        chunk.extend_from_slice(&data);
        chunk
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        // Namespace chunks must reference pooled strings, so intern on a copy.
        let mut this = Self {
            strings: self.strings.clone(),
            resource_ids: self.resource_ids.clone(),
            utf8: self.utf8,
            body: Vec::new(),
        };
        let prefix = this.intern("android");
        let uri = this.intern(ANDROID_NS);

        let mut body = Self::namespace_chunk(0x0100, prefix, uri);
        body.extend_from_slice(&self.body);
        body.extend_from_slice(&Self::namespace_chunk(0x0101, prefix, uri));

        let pool = this.string_pool();
        let mut resource_map = Vec::new();
        if !this.resource_ids.is_empty() {
            put_u16(&mut resource_map, 0x0180);
            put_u16(&mut resource_map, 8);
            put_u32(&mut resource_map, 8 + 4 * this.resource_ids.len() as u32);
            for id in &this.resource_ids {
                put_u32(&mut resource_map, *id);
            }
        }

        let mut doc = Vec::new();
        put_u16(&mut doc, 0x0003);
        put_u16(&mut doc, 8);
        put_u32(&mut doc, (8 + pool.len() + resource_map.len() + body.len()) as u32);
        doc.extend_from_slice(&pool);
        doc.extend_from_slice(&resource_map);
        doc.extend_from_slice(&body);
        doc
    }
}

/// Manifest with the usual `<manifest><application>` frame around the given activities.
///
/// Each activity is `(name, filters)`, each filter a list of `("action" | "category", value)`.
pub(crate) fn manifest_bytes(
    package: &str,
    activities: &[(&str, Vec<Vec<(&str, &str)>>)],
) -> Vec<u8> {
    let mut b = AxmlBuilder::new();
    b.start("manifest", &[("package", package)]).start("application", &[("label", "Fixture")]);
    for (name, filters) in activities {
        b.start("activity", &[("name", *name)]);
        for filter in filters {
            b.start("intent-filter", &[]);
            for &(kind, value) in filter {
                b.start(kind, &[("name", value)]).end(kind);
            }
            b.end("intent-filter");
        }
        b.end("activity");
    }
    b.end("application").end("manifest");
    b.build()
}

pub(crate) const MAIN: (&str, &str) = ("action", "android.intent.action.MAIN");
pub(crate) const LAUNCHER: (&str, &str) = ("category", "android.intent.category.LAUNCHER");
