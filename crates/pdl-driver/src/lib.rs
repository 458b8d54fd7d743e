// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Platform description driver.
//!
//! The unified entry point of the pipeline: parse a description (from text
//! or a file), process its includes, validate against the host catalog,
//! sort, and build the object graph onto the machine.
//!
//! All scratch state of one `process_*` call — source map, variable store,
//! plans, queues, the usings-in-progress stack — lives in that call's stack
//! frame and is dropped on exit, success or failure. Only the side effects
//! on the machine remain.

use pdl_ast::{Diagnostic, ErrorKind, SourceMap};
use pdl_build::{BuildError, Builder};
use pdl_host::{
    HostError, InitHandler, Machine, TypeCatalog, UsingResolver, MACHINE_KEYWORD,
};
use pdl_resolve::include::Includer;
use pdl_resolve::sort::{creation_graph, registration_graph, topological_order, SortKind};
use pdl_resolve::store::VariableStore;
use pdl_resolve::validate::validate;
use pdl_resolve::Ctx;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Synthetic file name used for text input.
const TEXT_INPUT_NAME: &str = "<description>";

/// The single rich error of the public API.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A reported diagnostic, already rendered against the pass's sources.
    #[error("{rendered}")]
    Parsing {
        kind: ErrorKind,
        /// Stable numeric error code (`Error E<NN>` in the rendering).
        code: u8,
        rendered: String,
    },
    /// Non-recoverable host failure, passed through untouched.
    #[error(transparent)]
    Host(HostError),
}

impl DriverError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DriverError::Parsing { kind, .. } => Some(*kind),
            DriverError::Host(_) => None,
        }
    }
}

/// The platform description driver.
///
/// Holds only the collaborators; every `process_*` call is an independent
/// pass over a fresh scratch state.
pub struct Driver<'a> {
    catalog: &'a TypeCatalog,
    machine: &'a mut dyn Machine,
    using_resolver: &'a dyn UsingResolver,
    init_handler: &'a dyn InitHandler,
}

enum Input<'s> {
    Text(&'s str),
    File(&'s Path),
}

impl<'a> Driver<'a> {
    pub fn new(
        catalog: &'a TypeCatalog,
        machine: &'a mut dyn Machine,
        using_resolver: &'a dyn UsingResolver,
        init_handler: &'a dyn InitHandler,
    ) -> Self {
        Self {
            catalog,
            machine,
            using_resolver,
            init_handler,
        }
    }

    /// Parse and apply a description given as source text.
    pub fn process_description(&mut self, source: &str) -> Result<(), DriverError> {
        self.process_inner(Input::Text(source))
    }

    /// Parse and apply a description file.
    pub fn process_file(&mut self, path: &Path) -> Result<(), DriverError> {
        self.process_inner(Input::File(path))
    }

    fn process_inner(&mut self, input: Input<'_>) -> Result<(), DriverError> {
        let mut sources = SourceMap::new();
        let mut store = VariableStore::new();

        let machine_type = self.machine.machine_type();
        store.register_builtin(MACHINE_KEYWORD, machine_type, self.machine.machine_object());
        for peripheral in self.machine.registered_peripherals() {
            store.register_builtin(&peripheral.name, peripheral.ty, peripheral.handle);
        }

        {
            let mut includer = Includer::new(self.using_resolver, &mut sources, &mut store);
            match input {
                Input::Text(text) => includer.process_text(TEXT_INPUT_NAME, text.to_string()),
                Input::File(path) => includer.process_file(path),
            }
            .map_err(|diagnostic| surface(diagnostic, &sources))?;
        }
        debug!(files = sources.file_count(), "descriptions processed");

        let ctx = Ctx {
            catalog: self.catalog,
            sources: &sources,
            machine_type,
        };
        let plans = validate(&ctx, &mut store, self.init_handler)
            .map_err(|diagnostic| surface(diagnostic, &sources))?;

        let creation_order = topological_order(&creation_graph(&plans), SortKind::Creation, &sources)
            .map_err(|diagnostic| surface(diagnostic, &sources))?;
        let registration_order =
            topological_order(&registration_graph(&plans), SortKind::Registration, &sources)
                .map_err(|diagnostic| surface(diagnostic, &sources))?;

        Builder::new(
            &ctx,
            self.machine,
            self.init_handler,
            &mut store,
            &plans,
            &creation_order,
            &registration_order,
        )
        .build()
        .map_err(|err| match err {
            BuildError::Diagnostic(diagnostic) => surface(diagnostic, &sources),
            BuildError::Host(host) => DriverError::Host(host),
        })?;

        info!(entries = plans.entries.len(), "description applied");
        Ok(())
    }
}

/// Render a diagnostic into the public error, while the pass's sources are
/// still alive.
fn surface(diagnostic: Diagnostic, sources: &SourceMap) -> DriverError {
    DriverError::Parsing {
        kind: diagnostic.kind,
        code: diagnostic.kind.code(),
        rendered: diagnostic.render(sources),
    }
}
