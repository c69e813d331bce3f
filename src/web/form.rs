use axum::extract::multipart::{Multipart, MultipartError};
use axum::body::Bytes;
use serde_json::Value;

use crate::image_processing::RawParams;

/// A file part as sent by the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client file name, possibly empty when the browser sent no file
    pub filename: String,
    pub data: Bytes,
}

/// Multipart body split into the `image` file part and text fields
#[derive(Debug, Default)]
pub struct FormData {
    pub image: Option<UploadedFile>,
    /// Text fields in arrival order
    pub fields: Vec<(String, String)>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut form = FormData::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);

            if name == "image" {
                let data = field.bytes().await?;
                // The first image part wins
                if form.image.is_none() {
                    form.image = Some(UploadedFile {
                        filename: filename.unwrap_or_default(),
                        data,
                    });
                }
            } else if filename.is_none() {
                let value = field.text().await?;
                form.fields.push((name, value));
            }
        }

        Ok(form)
    }

    /// Last value of a text field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Every text field except the excluded names, as string parameters
    pub fn params_except(&self, excluded: &[&str]) -> RawParams {
        self.fields
            .iter()
            .filter(|(key, _)| !excluded.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect()
    }
}
