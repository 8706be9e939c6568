//! Compiled-in plugin factories keyed by `(apiVersion, kind)`.

use rustc_hash::FxHashMap;

use crate::builtin::{
    AnnotationsTransformerPlugin, ConfigMapGeneratorPlugin, HashTransformerPlugin, LabelTransformerPlugin,
    NamespaceTransformerPlugin, PrefixSuffixTransformerPlugin, SecretGeneratorPlugin, BUILTIN,
};
use crate::{Generator, Transformer};

pub type GeneratorFactory = fn() -> Box<dyn Generator>;
pub type TransformerFactory = fn() -> Box<dyn Transformer>;

fn boxed_generator<T: Generator + Default + 'static>() -> Box<dyn Generator> {
    Box::<T>::default()
}

fn boxed_transformer<T: Transformer + Default + 'static>() -> Box<dyn Transformer> {
    Box::<T>::default()
}

#[derive(Clone, Copy)]
enum Entry {
    Generator(GeneratorFactory),
    Transformer(TransformerFactory),
}

#[derive(Clone, Default)]
pub struct Registry {
    entries: FxHashMap<(String, String), Entry>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the `builtin` plugins.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register_generator(BUILTIN, "ConfigMapGenerator", boxed_generator::<ConfigMapGeneratorPlugin>);
        r.register_generator(BUILTIN, "SecretGenerator", boxed_generator::<SecretGeneratorPlugin>);
        r.register_transformer(BUILTIN, "LabelTransformer", boxed_transformer::<LabelTransformerPlugin>);
        r.register_transformer(BUILTIN, "AnnotationsTransformer", boxed_transformer::<AnnotationsTransformerPlugin>);
        r.register_transformer(BUILTIN, "PrefixSuffixTransformer", boxed_transformer::<PrefixSuffixTransformerPlugin>);
        r.register_transformer(BUILTIN, "NamespaceTransformer", boxed_transformer::<NamespaceTransformerPlugin>);
        r.register_transformer(BUILTIN, "HashTransformer", boxed_transformer::<HashTransformerPlugin>);
        r
    }

    pub fn register_generator(&mut self, api_version: &str, kind: &str, f: GeneratorFactory) {
        self.entries.insert((api_version.to_string(), kind.to_string()), Entry::Generator(f));
    }

    pub fn register_transformer(&mut self, api_version: &str, kind: &str, f: TransformerFactory) {
        self.entries.insert((api_version.to_string(), kind.to_string()), Entry::Transformer(f));
    }

    pub fn contains(&self, api_version: &str, kind: &str) -> bool {
        self.entries.contains_key(&(api_version.to_string(), kind.to_string()))
    }

    /// A fresh, unconfigured generator.
    pub fn generator(&self, api_version: &str, kind: &str) -> Option<Box<dyn Generator>> {
        match self.entries.get(&(api_version.to_string(), kind.to_string()))? {
            Entry::Generator(f) => Some(f()),
            Entry::Transformer(_) => None,
        }
    }

    /// A fresh, unconfigured transformer.
    pub fn transformer(&self, api_version: &str, kind: &str) -> Option<Box<dyn Transformer>> {
        match self.entries.get(&(api_version.to_string(), kind.to_string()))? {
            Entry::Transformer(f) => Some(f()),
            Entry::Generator(_) => None,
        }
    }
}
