use aws_sdk_s3::primitives::ByteStream;
use bakery_array::{ObjectStore, StoreMapper};

pub trait OutcomeStore {
    fn write_object(&self, key: &str, body: &[u8]) -> Result<(), String>;
}

impl OutcomeStore for StoreMapper {
    fn write_object(&self, key: &str, body: &[u8]) -> Result<(), String> {
        self.put(key, body).map_err(|error| error.to_string())
    }
}

/// S3 behind the `s3://` scheme. Keys are `bucket/object-key`, which is what
/// a `s3://bucket/prefix` locator resolves to.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

impl ObjectStore for S3ObjectStore {
    fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let (bucket, object_key) = split_bucket_key(key)?;
        let client = self.client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = match client.get_object().bucket(bucket).key(object_key).send().await {
                    Ok(output) => output,
                    Err(error)
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_no_such_key()) =>
                    {
                        return Ok(None);
                    }
                    Err(error) => return Err(format!("failed to read object from s3: {error}")),
                };
                output
                    .body
                    .collect()
                    .await
                    .map(|data| Some(data.into_bytes().to_vec()))
                    .map_err(|error| format!("failed to read s3 object body: {error}"))
            })
        })
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), String> {
        let (bucket, object_key) = split_bucket_key(key)?;
        let body_bytes = body.to_vec();
        let client = self.client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(object_key)
                    .body(ByteStream::from(body_bytes))
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to write object to s3: {error}"))
            })
        })
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, String> {
        let (bucket, object_prefix) = split_bucket_key(prefix)?;
        let object_prefix = match object_prefix.trim_end_matches('/') {
            "" => String::new(),
            trimmed => format!("{trimmed}/"),
        };
        let client = self.client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let mut keys = Vec::new();
                let mut continuation: Option<String> = None;
                loop {
                    let output = client
                        .list_objects_v2()
                        .bucket(bucket)
                        .prefix(&object_prefix)
                        .set_continuation_token(continuation.take())
                        .send()
                        .await
                        .map_err(|error| format!("failed to list s3 objects: {error}"))?;
                    keys.extend(
                        output
                            .contents()
                            .iter()
                            .filter_map(|object| object.key())
                            .map(|key| format!("{bucket}/{key}")),
                    );
                    match output.next_continuation_token() {
                        Some(token) if output.is_truncated().unwrap_or(false) => {
                            continuation = Some(token.to_string());
                        }
                        _ => break,
                    }
                }
                keys.sort();
                Ok(keys)
            })
        })
    }

    fn delete_object(&self, key: &str) -> Result<(), String> {
        let (bucket, object_key) = split_bucket_key(key)?;
        let client = self.client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(object_key)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to delete object from s3: {error}"))
            })
        })
    }
}

fn split_bucket_key(key: &str) -> Result<(&str, &str), String> {
    let key = key.trim_start_matches('/');
    let (bucket, object_key) = key.split_once('/').unwrap_or((key, ""));
    if bucket.is_empty() {
        return Err(format!("s3 key '{key}' does not name a bucket"));
    }
    Ok((bucket, object_key))
}
