// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ADBC Driver implementation for Impala.

use crate::client::Connector;
use crate::database::Database;
use adbc_core::error::Result;
use adbc_core::options::{OptionDatabase, OptionValue};
use adbc_core::Optionable;
use std::sync::Arc;

/// The main entry point for the Impala ADBC driver.
///
/// The Driver is responsible for creating Database instances, which in turn
/// create Connections. A connector set here is handed to every database.
#[derive(Debug, Default)]
pub struct Driver {
    connector: Option<Arc<dyn Connector>>,
}

impl Driver {
    /// Creates a new Driver instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the HS2 RPC codec used by connections from this driver.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    fn database(&self) -> Database {
        match &self.connector {
            Some(connector) => Database::new().with_connector(connector.clone()),
            None => Database::new(),
        }
    }
}

impl adbc_core::Driver for Driver {
    type DatabaseType = Database;

    fn new_database(&mut self) -> Result<Self::DatabaseType> {
        Ok(self.database())
    }

    fn new_database_with_opts(
        &mut self,
        opts: impl IntoIterator<Item = (OptionDatabase, OptionValue)>,
    ) -> Result<Self::DatabaseType> {
        let mut database = self.database();
        for (key, value) in opts {
            database.set_option(key, value)?;
        }
        Ok(database)
    }
}
