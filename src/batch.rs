//! Validates or dumps many compiled files at once.
//!
//! Readers are single-threaded, so every file gets its own
//! [`ReaderContext`] built from `schema` inside the task that reads it.

use std::rc::Rc;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::decode::{self, ReaderContext};
use crate::error::FormatError;
use crate::options::LoadOptions;
use crate::schema::SchemaResolver;

#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 4;

fn run<T, F>(buffers: &[Arc<[u8]>], task: F) -> Vec<Result<T, FormatError>>
where
    T: Send,
    F: Fn(&Arc<[u8]>) -> Result<T, FormatError> + Sync,
{
    #[cfg(feature = "parallel")]
    {
        if buffers.len() >= PARALLEL_THRESHOLD {
            return buffers.par_iter().map(&task).collect();
        }
    }

    buffers.iter().map(task).collect()
}

/// Grammar-checks each buffer, returning its token count. Results are in
/// input order.
pub fn validate_all<F>(
    buffers: &[Arc<[u8]>],
    schema: F,
    options: &LoadOptions,
) -> Vec<Result<usize, FormatError>>
where
    F: Fn() -> Rc<dyn SchemaResolver> + Sync,
{
    run(buffers, |buffer| {
        let ctx = ReaderContext::new(schema());
        decode::validate(Arc::clone(buffer), &ctx, options)
    })
}

/// Decodes each buffer into its JSON token dump.
pub fn dump_all<F>(
    buffers: &[Arc<[u8]>],
    schema: F,
    options: &LoadOptions,
) -> Vec<Result<serde_json::Value, FormatError>>
where
    F: Fn() -> Rc<dyn SchemaResolver> + Sync,
{
    run(buffers, |buffer| {
        let ctx = ReaderContext::new(schema());
        decode::decode(Arc::clone(buffer), &ctx, options).map(|tokens| tokens.to_json())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{AssemblyName, TypeName, XbfWriter};
    use crate::options::{ResolvePolicy, WriteOptions};
    use crate::schema::PermissiveResolver;

    fn page(name: &str) -> Arc<[u8]> {
        let mut writer = XbfWriter::new(WriteOptions::default());
        writer.start_object(&TypeName::new(AssemblyName::managed("App"), "App", name));
        writer.end_object();
        Arc::from(writer.finish(&[0; 64]).unwrap().into_boxed_slice())
    }

    #[rstest::rstest]
    fn test_results_keep_input_order() {
        let mut buffers: Vec<Arc<[u8]>> = (0..6).map(|i| page(&format!("Page{i}"))).collect();
        buffers[3] = Arc::from(b"not compiled".to_vec().into_boxed_slice());
        let options = LoadOptions::new().with_resolve_policy(ResolvePolicy::Report);
        let results = validate_all(
            &buffers,
            || Rc::new(PermissiveResolver::new()) as Rc<dyn SchemaResolver>,
            &options,
        );
        assert_eq!(results.len(), 6);
        for (index, result) in results.iter().enumerate() {
            if index == 3 {
                assert_eq!(result, &Err(FormatError::BadMagic));
            } else {
                assert_eq!(result, &Ok(3));
            }
        }
    }

    #[rstest::rstest]
    fn test_dump_all() {
        let buffers = vec![page("Shell")];
        let dumps = dump_all(
            &buffers,
            || Rc::new(PermissiveResolver::new()) as Rc<dyn SchemaResolver>,
            &LoadOptions::default(),
        );
        let dump = dumps[0].as_ref().unwrap();
        assert_eq!(dump.as_array().map(Vec::len), Some(3));
    }
}
