//! Synthesizes small but well-formed PE images for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const PE_POINTER: u32 = 0x80;
pub const SECTION_RVA: u32 = 0x2000;
pub const SECTION_FILE_OFFSET: u32 = 0x200;

pub const MACHINE_I386: u16 = 0x014c;
pub const MACHINE_AMD64: u16 = 0x8664;

pub const COR_IL_ONLY: u32 = 0x1;
pub const COR_32BIT_REQUIRED: u32 = 0x2;

trait Put {
    fn put_u8(&mut self, v: u8);
    fn put_u16(&mut self, v: u16);
    fn put_u32(&mut self, v: u32);
    fn put_u64(&mut self, v: u64);
    fn pad_to(&mut self, align: usize);
}

impl Put for Vec<u8> {
    fn put_u8(&mut self, v: u8) {
        self.push(v);
    }
    fn put_u16(&mut self, v: u16) {
        self.extend_from_slice(&v.to_le_bytes());
    }
    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_le_bytes());
    }
    fn put_u64(&mut self, v: u64) {
        self.extend_from_slice(&v.to_le_bytes());
    }
    fn pad_to(&mut self, align: usize) {
        while self.len() % align != 0 {
            self.push(0);
        }
    }
}

fn patch_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// One assembly-level custom attribute.
#[derive(Debug, Clone)]
pub enum Attr {
    /// `DebuggableAttribute(DebuggingModes)` referenced through MemberRef/TypeRef.
    Debuggable(u32),
    /// `DebuggableAttribute(bool isJITTrackingEnabled, bool isJITOptimizerDisabled)`.
    DebuggableFlags { tracking: bool, optimizer_disabled: bool },
    /// `DebuggableAttribute(DebuggingModes)` whose type is defined in this module.
    LocalDebuggable(u32),
    /// Any other attribute taking no arguments.
    Other { namespace: &'static str, name: &'static str },
    /// A DebuggableAttribute whose value blob index points past the heap.
    DanglingDebuggable,
}

#[derive(Debug, Clone)]
pub struct Managed {
    pub runtime_version: String,
    pub cor_flags: u32,
    pub attributes: Vec<Attr>,
    pub break_signature: bool,
}

impl Default for Managed {
    fn default() -> Self {
        Self {
            runtime_version: "v4.0.30319".into(),
            cor_flags: COR_IL_ONLY,
            attributes: Vec::new(),
            break_signature: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeBuilder {
    pub machine: u16,
    pub pe32_plus: bool,
    pub timestamp: i32,
    pub file_version: Option<[u16; 4]>,
    pub managed: Option<Managed>,
}

impl Default for PeBuilder {
    fn default() -> Self {
        Self {
            machine: MACHINE_I386,
            pe32_plus: false,
            timestamp: 1_700_000_000,
            file_version: None,
            managed: None,
        }
    }
}

impl PeBuilder {
    pub fn native() -> Self {
        Self::default()
    }

    pub fn managed(attributes: Vec<Attr>) -> Self {
        Self {
            managed: Some(Managed {
                attributes,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut section: Vec<u8> = Vec::new();
        let mut clr_dir = (0u32, 0u32);
        let mut rsrc_dir = (0u32, 0u32);

        if let Some(managed) = &self.managed {
            let metadata = build_metadata(managed);
            let metadata_rva = SECTION_RVA + 72;
            section.put_u32(72);
            section.put_u16(2);
            section.put_u16(5);
            section.put_u32(metadata_rva);
            section.put_u32(metadata.len() as u32);
            section.put_u32(managed.cor_flags);
            section.resize(72, 0);
            section.extend_from_slice(&metadata);
            section.pad_to(4);
            clr_dir = (SECTION_RVA, 72);
        } else {
            // ret
            section.put_u8(0xc3);
            section.pad_to(4);
        }

        if let Some(version) = self.file_version {
            let rva = SECTION_RVA + section.len() as u32;
            let rsrc = build_version_resource(rva, version);
            rsrc_dir = (rva, rsrc.len() as u32);
            section.extend_from_slice(&rsrc);
        }

        let virtual_size = section.len() as u32;
        let raw_size = (virtual_size + 0x1ff) & !0x1ff;
        let size_of_image = SECTION_RVA + ((virtual_size + 0x1fff) & !0x1fff);

        let mut out: Vec<u8> = Vec::new();
        // DOS header
        out.extend_from_slice(b"MZ");
        out.resize(0x3c, 0);
        out.put_u32(PE_POINTER);
        out.resize(PE_POINTER as usize, 0);

        out.extend_from_slice(b"PE\0\0");
        out.put_u16(self.machine);
        out.put_u16(1);
        out.put_u32(self.timestamp as u32);
        out.put_u32(0);
        out.put_u32(0);
        out.put_u16(if self.pe32_plus { 240 } else { 224 });
        out.put_u16(if self.pe32_plus { 0x0022 } else { 0x0102 });

        // Optional header
        out.put_u16(if self.pe32_plus { 0x20b } else { 0x10b });
        out.put_u8(8);
        out.put_u8(0);
        out.put_u32(raw_size);
        out.put_u32(0);
        out.put_u32(0);
        out.put_u32(0);
        out.put_u32(SECTION_RVA);
        if self.pe32_plus {
            out.put_u64(0x1_4000_0000);
        } else {
            out.put_u32(0);
            out.put_u32(0x40_0000);
        }
        out.put_u32(0x2000);
        out.put_u32(0x200);
        out.put_u16(4);
        out.put_u16(0);
        out.put_u16(0);
        out.put_u16(0);
        out.put_u16(4);
        out.put_u16(0);
        out.put_u32(0);
        out.put_u32(size_of_image);
        out.put_u32(SECTION_FILE_OFFSET);
        out.put_u32(0);
        out.put_u16(3);
        out.put_u16(0x8540);
        for v in [0x10_0000u64, 0x1000, 0x10_0000, 0x1000] {
            if self.pe32_plus {
                out.put_u64(v);
            } else {
                out.put_u32(v as u32);
            }
        }
        out.put_u32(0);
        out.put_u32(16);
        for index in 0..16 {
            let (rva, size) = match index {
                2 => rsrc_dir,
                14 => clr_dir,
                _ => (0, 0),
            };
            out.put_u32(rva);
            out.put_u32(size);
        }

        // Section table
        out.extend_from_slice(b".text\0\0\0");
        out.put_u32(virtual_size);
        out.put_u32(SECTION_RVA);
        out.put_u32(raw_size);
        out.put_u32(SECTION_FILE_OFFSET);
        out.put_u32(0);
        out.put_u32(0);
        out.put_u16(0);
        out.put_u16(0);
        out.put_u32(0x6000_0020);

        out.resize(SECTION_FILE_OFFSET as usize, 0);
        out.extend_from_slice(&section);
        out.resize((SECTION_FILE_OFFSET + raw_size) as usize, 0);
        out
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

#[derive(Default)]
struct Heaps {
    strings: Vec<u8>,
    string_index: HashMap<String, u16>,
    blobs: Vec<u8>,
}

impl Heaps {
    fn new() -> Self {
        Self {
            strings: vec![0],
            blobs: vec![0],
            ..Default::default()
        }
    }

    fn string(&mut self, s: &str) -> u16 {
        if let Some(&i) = self.string_index.get(s) {
            return i;
        }
        let i = self.strings.len() as u16;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        self.string_index.insert(s.to_string(), i);
        i
    }

    fn blob(&mut self, bytes: &[u8]) -> u16 {
        assert!(bytes.len() < 0x80);
        let i = self.blobs.len() as u16;
        self.blobs.push(bytes.len() as u8);
        self.blobs.extend_from_slice(bytes);
        i
    }
}

const MODES_CTOR: [u8; 5] = [0x20, 0x01, 0x01, 0x11, 0x09];
const BOOL_CTOR: [u8; 5] = [0x20, 0x02, 0x01, 0x02, 0x02];
const EMPTY_CTOR: [u8; 3] = [0x20, 0x00, 0x01];

fn modes_value(modes: u32) -> Vec<u8> {
    let mut v: Vec<u8> = vec![0x01, 0x00];
    v.put_u32(modes);
    v.put_u16(0);
    v
}

fn build_metadata(managed: &Managed) -> Vec<u8> {
    let mut heaps = Heaps::new();

    let mut type_refs: Vec<[u16; 3]> = Vec::new();
    let mut member_refs: Vec<[u16; 3]> = Vec::new();
    let mut custom_attributes: Vec<[u16; 3]> = Vec::new();
    let mut type_defs: Vec<(u32, [u16; 5])> = Vec::new();
    let mut method_defs: Vec<(u32, [u16; 5])> = Vec::new();

    let module_name = heaps.string("app.exe");
    let ctor = heaps.string(".ctor");
    // Parent: HasCustomAttribute -> Assembly #1
    let assembly_parent = (1 << 5) | 14;

    let member_ref = |heaps: &mut Heaps,
                          type_refs: &mut Vec<[u16; 3]>,
                          member_refs: &mut Vec<[u16; 3]>,
                          namespace: &str,
                          name: &str,
                          sig: &[u8]| {
        let scope = (1 << 2) | 2;
        type_refs.push([scope, heaps.string(name), heaps.string(namespace)]);
        let class = ((type_refs.len() as u16) << 3) | 1;
        member_refs.push([class, ctor, heaps.blob(sig)]);
        ((member_refs.len() as u16) << 3) | 3
    };

    for attr in &managed.attributes {
        let row = match attr {
            Attr::Debuggable(modes) => {
                let ty = member_ref(
                    &mut heaps,
                    &mut type_refs,
                    &mut member_refs,
                    "System.Diagnostics",
                    "DebuggableAttribute",
                    &MODES_CTOR,
                );
                [assembly_parent, ty, heaps.blob(&modes_value(*modes))]
            }
            Attr::DebuggableFlags {
                tracking,
                optimizer_disabled,
            } => {
                let ty = member_ref(
                    &mut heaps,
                    &mut type_refs,
                    &mut member_refs,
                    "System.Diagnostics",
                    "DebuggableAttribute",
                    &BOOL_CTOR,
                );
                let value = [1, 0, *tracking as u8, *optimizer_disabled as u8, 0, 0];
                [assembly_parent, ty, heaps.blob(&value)]
            }
            Attr::LocalDebuggable(modes) => {
                if type_defs.is_empty() {
                    type_defs.push((0, [heaps.string("<Module>"), 0, 0, 1, 1]));
                }
                // ImplFlags, Flags, Name, Signature, ParamList
                method_defs.push((0, [0, 0x1886, ctor, heaps.blob(&MODES_CTOR), 1]));
                let method = method_defs.len() as u16;
                type_defs.push((
                    0x0010_0101,
                    [
                        heaps.string("DebuggableAttribute"),
                        heaps.string("System.Diagnostics"),
                        0,
                        1,
                        method,
                    ],
                ));
                [assembly_parent, (method << 3) | 2, heaps.blob(&modes_value(*modes))]
            }
            Attr::Other { namespace, name } => {
                let ty = member_ref(
                    &mut heaps,
                    &mut type_refs,
                    &mut member_refs,
                    namespace,
                    name,
                    &EMPTY_CTOR,
                );
                [assembly_parent, ty, heaps.blob(&[1, 0, 0, 0])]
            }
            Attr::DanglingDebuggable => {
                let ty = member_ref(
                    &mut heaps,
                    &mut type_refs,
                    &mut member_refs,
                    "System.Diagnostics",
                    "DebuggableAttribute",
                    &MODES_CTOR,
                );
                [assembly_parent, ty, 0x7ff0]
            }
        };
        custom_attributes.push(row);
    }
    let assembly_name = heaps.string("app");

    // Tables stream
    let mut counts: Vec<(u8, u32)> = vec![(0x00, 1)];
    if !type_refs.is_empty() {
        counts.push((0x01, type_refs.len() as u32));
    }
    if !type_defs.is_empty() {
        counts.push((0x02, type_defs.len() as u32));
    }
    if !method_defs.is_empty() {
        counts.push((0x06, method_defs.len() as u32));
    }
    if !member_refs.is_empty() {
        counts.push((0x0a, member_refs.len() as u32));
    }
    if !custom_attributes.is_empty() {
        counts.push((0x0c, custom_attributes.len() as u32));
    }
    counts.push((0x20, 1));

    let mut tables: Vec<u8> = Vec::new();
    tables.put_u32(0);
    tables.put_u8(2);
    tables.put_u8(0);
    tables.put_u8(0);
    tables.put_u8(1);
    let valid = counts.iter().fold(0u64, |acc, (t, _)| acc | (1 << t));
    tables.put_u64(valid);
    tables.put_u64(0x0000_1600_3325_fa00);
    for (_, n) in &counts {
        tables.put_u32(*n);
    }

    // Module
    tables.put_u16(0);
    tables.put_u16(module_name);
    tables.put_u16(1);
    tables.put_u16(0);
    tables.put_u16(0);
    for row in &type_refs {
        row.iter().for_each(|v| tables.put_u16(*v));
    }
    for (flags, row) in &type_defs {
        tables.put_u32(*flags);
        row.iter().for_each(|v| tables.put_u16(*v));
    }
    for (rva, row) in &method_defs {
        tables.put_u32(*rva);
        row.iter().for_each(|v| tables.put_u16(*v));
    }
    for row in &member_refs {
        row.iter().for_each(|v| tables.put_u16(*v));
    }
    for row in &custom_attributes {
        row.iter().for_each(|v| tables.put_u16(*v));
    }
    // Assembly
    tables.put_u32(0x8004);
    for v in [1u16, 0, 0, 0] {
        tables.put_u16(v);
    }
    tables.put_u32(0);
    tables.put_u16(0);
    tables.put_u16(assembly_name);
    tables.put_u16(0);
    tables.pad_to(4);

    let mut strings = heaps.strings;
    strings.pad_to(4);
    let mut blobs = heaps.blobs;
    blobs.pad_to(4);
    let guids = vec![0x11u8; 16];
    let user_strings = vec![0u8; 4];

    let streams: [(&str, &Vec<u8>); 5] = [
        ("#~", &tables),
        ("#Strings", &strings),
        ("#US", &user_strings),
        ("#GUID", &guids),
        ("#Blob", &blobs),
    ];

    let mut version = managed.runtime_version.as_bytes().to_vec();
    version.push(0);
    version.pad_to(4);

    let headers_len: usize = 16
        + version.len()
        + 4
        + streams
            .iter()
            .map(|(name, _)| 8 + ((name.len() + 1 + 3) & !3))
            .sum::<usize>();

    let mut root: Vec<u8> = Vec::new();
    root.put_u32(if managed.break_signature { 0xdead_beef } else { 0x424a_5342 });
    root.put_u16(1);
    root.put_u16(1);
    root.put_u32(0);
    root.put_u32(version.len() as u32);
    root.extend_from_slice(&version);
    root.put_u16(0);
    root.put_u16(streams.len() as u16);

    let mut offset = headers_len;
    for (name, data) in &streams {
        root.put_u32(offset as u32);
        root.put_u32(data.len() as u32);
        root.extend_from_slice(name.as_bytes());
        root.push(0);
        root.pad_to(4);
        offset += data.len();
    }
    assert_eq!(root.len(), headers_len);
    for (_, data) in &streams {
        root.extend_from_slice(data);
    }
    root
}

fn build_version_resource(rva: u32, version: [u16; 4]) -> Vec<u8> {
    let mut r: Vec<u8> = Vec::new();
    // type directory -> RT_VERSION
    for (id, target) in [(16u32, 0x8000_0018u32), (1, 0x8000_0030), (0x409, 0x48)] {
        r.put_u32(0);
        r.put_u32(0);
        r.put_u16(0);
        r.put_u16(0);
        r.put_u16(0);
        r.put_u16(1);
        r.put_u32(id);
        r.put_u32(target);
    }
    assert_eq!(r.len(), 0x48);

    let mut info: Vec<u8> = Vec::new();
    info.put_u16(0);
    info.put_u16(52);
    info.put_u16(0);
    for c in "VS_VERSION_INFO\0".encode_utf16() {
        info.put_u16(c);
    }
    info.pad_to(4);
    info.put_u32(0xfeef_04bd);
    info.put_u32(0x0001_0000);
    info.put_u32((u32::from(version[0]) << 16) | u32::from(version[1]));
    info.put_u32((u32::from(version[2]) << 16) | u32::from(version[3]));
    info.put_u32((u32::from(version[0]) << 16) | u32::from(version[1]));
    info.put_u32((u32::from(version[2]) << 16) | u32::from(version[3]));
    for _ in 0..7 {
        info.put_u32(0);
    }
    let len = info.len() as u16;
    info[0..2].copy_from_slice(&len.to_le_bytes());

    // data entry
    r.put_u32(rva + 0x58);
    r.put_u32(info.len() as u32);
    r.put_u32(0);
    r.put_u32(0);
    assert_eq!(r.len(), 0x58);
    r.extend_from_slice(&info);
    r.pad_to(4);
    r
}

/// Bytes that look nothing like a PE image but are long enough for the header read.
pub fn plain_text() -> Vec<u8> {
    let mut text = b"These are release notes, not an executable. ".repeat(4);
    patch_u32(&mut text, 60, 16);
    text
}
