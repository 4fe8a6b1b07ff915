//! XML bodies for bucket/object descriptors and errors.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesText, Event},
};
use std::io;

use crate::models::{bucket::Bucket, object::Object};

type XmlWriter = Writer<Vec<u8>>;

pub fn bucket(bucket: &Bucket) -> io::Result<Vec<u8>> {
    document(|w| write_bucket(w, bucket))
}

pub fn bucket_list(buckets: &[Bucket]) -> io::Result<Vec<u8>> {
    document(|w| {
        w.create_element("BucketList").write_inner_content(|w| {
            for bucket in buckets {
                write_bucket(w, bucket)?;
            }
            Ok(())
        })?;
        Ok(())
    })
}

pub fn object(object: &Object) -> io::Result<Vec<u8>> {
    document(|w| write_object(w, object))
}

pub fn object_list(bucket: &str, objects: &[Object]) -> io::Result<Vec<u8>> {
    document(|w| {
        w.create_element("ObjectList").write_inner_content(|w| {
            text_element(w, "Name", bucket)?;
            text_element(w, "KeyCount", &objects.len().to_string())?;
            for object in objects {
                write_object(w, object)?;
            }
            Ok(())
        })?;
        Ok(())
    })
}

pub fn error(code: &str, message: &str) -> io::Result<Vec<u8>> {
    document(|w| {
        w.create_element("Error").write_inner_content(|w| {
            text_element(w, "Code", code)?;
            text_element(w, "Message", message)
        })?;
        Ok(())
    })
}

/// Declaration followed by whatever `body` writes.
fn document<F>(body: F) -> io::Result<Vec<u8>>
where
    F: FnOnce(&mut XmlWriter) -> io::Result<()>,
{
    let mut writer = Writer::new(Vec::with_capacity(256));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    body(&mut writer)?;
    Ok(writer.into_inner())
}

fn write_bucket(w: &mut XmlWriter, bucket: &Bucket) -> io::Result<()> {
    w.create_element("Bucket").write_inner_content(|w| {
        text_element(w, "Name", &bucket.name)?;
        text_element(w, "CreationTime", &timestamp(&bucket.creation_time))?;
        text_element(w, "LastModifiedTime", &timestamp(&bucket.last_modified_time))?;
        text_element(w, "Status", &bucket.status.to_string())
    })?;
    Ok(())
}

fn write_object(w: &mut XmlWriter, object: &Object) -> io::Result<()> {
    w.create_element("Object").write_inner_content(|w| {
        text_element(w, "BucketName", &object.bucket_name)?;
        text_element(w, "Key", &object.key)?;
        text_element(w, "ContentType", &object.content_type)?;
        text_element(w, "Size", &object.size)?;
        text_element(w, "LastModifiedTime", &timestamp(&object.last_modified))
    })?;
    Ok(())
}

fn text_element(w: &mut XmlWriter, tag: &str, text: &str) -> io::Result<()> {
    w.create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
