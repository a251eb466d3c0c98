//! The published file set of one artifact.

use chrono::Datelike;

use crate::attachments::Attachment;
use crate::synth::SynthesizedCode;

pub const APP_FILE: &str = "index.html";
pub const README_FILE: &str = "README.md";
pub const LICENSE_FILE: &str = "LICENSE";

/// Files the service always writes; attachments may not use these names.
pub const RESERVED_FILES: [&str; 3] = [APP_FILE, README_FILE, LICENSE_FILE];

/// One file to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub content: Vec<u8>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Everything one round publishes.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub app_source: String,
    pub readme: String,
    pub license: String,
}

impl GeneratedArtifact {
    pub fn new(code: SynthesizedCode, license_holder: &str) -> Self {
        Self {
            app_source: code.app_source,
            readme: code.readme,
            license: mit_license(chrono::Utc::now().year(), license_holder),
        }
    }

    /// Fixed files first, then attachments in caller order.
    pub fn into_files(self, attachments: Vec<Attachment>) -> Vec<FileEntry> {
        let mut files = vec![
            FileEntry::new(APP_FILE, self.app_source),
            FileEntry::new(README_FILE, self.readme),
            FileEntry::new(LICENSE_FILE, self.license),
        ];
        files.extend(
            attachments
                .into_iter()
                .map(|a| FileEntry::new(a.name, a.bytes)),
        );
        files
    }
}

pub fn mit_license(year: i32, holder: &str) -> String {
    format!(
        r#"MIT License

Copyright (c) {year} {holder}

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
"#
    )
}
