use serde::Serialize;
use tracing::{debug, info};

use nimbus_core::{FieldDescriptor, FieldSet, FieldValue, ObjectId, Persist};
use nimbus_storage::{Database, DatabaseError, DocumentStore, Query};

use crate::config::HostConfig;
use crate::error::{ErrorData, InstanceError, ValidationError};
use crate::state::{derive_status, InstanceState, Status, VmState};
use crate::vm::{self, Disk, NetworkAdapter, VirtualMachine, VmDisk};

pub const COLLECTION: &str = "instances";

pub const MIN_MEMORY: i64 = 256;
pub const MIN_PROCESSORS: i64 = 1;

// Persisted field names.
pub const ORGANIZATION: &str = "organization";
pub const ZONE: &str = "zone";
pub const IMAGE: &str = "image";
pub const STATE: &str = "state";
pub const VM_STATE: &str = "vm_state";
pub const PUBLIC_IP: &str = "public_ip";
pub const PUBLIC_IP6: &str = "public_ip6";
pub const NODE: &str = "node";
pub const NAME: &str = "name";
pub const MEMORY: &str = "memory";
pub const PROCESSORS: &str = "processors";
pub const NETWORK_ROLES: &str = "network_roles";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instance {
    pub id: Option<ObjectId>,
    pub organization: Option<ObjectId>,
    pub zone: Option<ObjectId>,
    pub image: Option<ObjectId>,
    pub state: Option<InstanceState>,
    pub vm_state: Option<VmState>,
    pub public_ip: String,
    pub public_ip6: String,
    pub node: Option<ObjectId>,
    pub name: String,
    pub memory: i64,
    pub processors: i64,
    pub network_roles: Option<Vec<String>>,
}

fn state_value(state: Option<&'static str>) -> FieldValue {
    state.map_or(FieldValue::Null, FieldValue::from)
}

fn text_or_null(value: FieldValue, field: &str) -> Result<Option<String>, nimbus_core::CoreError> {
    let text = value.into_text(field)?;
    Ok((!text.is_empty()).then_some(text))
}

static INSTANCE_FIELDS: &[FieldDescriptor<Instance>] = &[
    FieldDescriptor {
        name: ORGANIZATION,
        omit_empty: true,
        get: |i| FieldValue::Ref(i.organization),
        set: |i, v| {
            i.organization = v.into_ref(ORGANIZATION)?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: ZONE,
        omit_empty: true,
        get: |i| FieldValue::Ref(i.zone),
        set: |i, v| {
            i.zone = v.into_ref(ZONE)?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: IMAGE,
        omit_empty: true,
        get: |i| FieldValue::Ref(i.image),
        set: |i, v| {
            i.image = v.into_ref(IMAGE)?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: STATE,
        omit_empty: false,
        get: |i| state_value(i.state.map(|s| s.as_str())),
        set: |i, v| {
            i.state = text_or_null(v, STATE)?
                .map(|s| InstanceState::parse(&s))
                .transpose()?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: VM_STATE,
        omit_empty: false,
        get: |i| state_value(i.vm_state.map(|s| s.as_str())),
        set: |i, v| {
            i.vm_state = text_or_null(v, VM_STATE)?
                .map(|s| VmState::parse(&s))
                .transpose()?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: PUBLIC_IP,
        omit_empty: false,
        get: |i| FieldValue::Text(i.public_ip.clone()),
        set: |i, v| {
            i.public_ip = v.into_text(PUBLIC_IP)?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: PUBLIC_IP6,
        omit_empty: false,
        get: |i| FieldValue::Text(i.public_ip6.clone()),
        set: |i, v| {
            i.public_ip6 = v.into_text(PUBLIC_IP6)?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: NODE,
        omit_empty: true,
        get: |i| FieldValue::Ref(i.node),
        set: |i, v| {
            i.node = v.into_ref(NODE)?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: NAME,
        omit_empty: false,
        get: |i| FieldValue::Text(i.name.clone()),
        set: |i, v| {
            i.name = v.into_text(NAME)?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: MEMORY,
        omit_empty: false,
        get: |i| FieldValue::Integer(i.memory),
        set: |i, v| {
            i.memory = v.into_integer(MEMORY)?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: PROCESSORS,
        omit_empty: false,
        get: |i| FieldValue::Integer(i.processors),
        set: |i, v| {
            i.processors = v.into_integer(PROCESSORS)?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: NETWORK_ROLES,
        omit_empty: false,
        get: |i| {
            i.network_roles
                .clone()
                .map_or(FieldValue::Null, FieldValue::TextList)
        },
        set: |i, v| {
            i.network_roles = v.into_text_list(NETWORK_ROLES)?;
            Ok(())
        },
    },
];

impl Persist for Instance {
    const COLLECTION: &'static str = COLLECTION;

    fn fields() -> &'static [FieldDescriptor<Self>] {
        INSTANCE_FIELDS
    }

    fn id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }
}

/// API projection of an instance, including the derived status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceView {
    pub id: Option<ObjectId>,
    pub organization: Option<ObjectId>,
    pub zone: Option<ObjectId>,
    pub image: Option<ObjectId>,
    pub status: Option<Status>,
    pub state: Option<InstanceState>,
    pub vm_state: Option<VmState>,
    pub public_ip: String,
    pub public_ip6: String,
    pub node: Option<ObjectId>,
    pub name: String,
    pub memory: i64,
    pub processors: i64,
    pub network_roles: Vec<String>,
}

impl Instance {
    /// Applies defaults in place, then checks that every required reference
    /// is set. The defaults stick even when validation fails.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        if self.state.is_none() {
            self.state = Some(InstanceState::Running);
        }
        if self.memory < MIN_MEMORY {
            self.memory = MIN_MEMORY;
        }
        if self.processors < MIN_PROCESSORS {
            self.processors = MIN_PROCESSORS;
        }
        if self.network_roles.is_none() {
            self.network_roles = Some(Vec::new());
        }

        let mut errors = Vec::new();
        if self.organization.is_none() {
            errors.push(ErrorData::new(
                "organization_required",
                "Missing required organization",
            ));
        }
        if self.zone.is_none() {
            errors.push(ErrorData::new("zone_required", "Missing required zone"));
        }
        if self.node.is_none() {
            errors.push(ErrorData::new("node_required", "Missing required node"));
        }
        if self.image.is_none() {
            errors.push(ErrorData::new("image_required", "Missing required image"));
        }

        match ValidationError::from_errors(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// `None` until an administrative state has been set.
    pub fn status(&self) -> Option<Status> {
        self.state.map(|state| derive_status(state, self.vm_state))
    }

    pub fn view(&self) -> InstanceView {
        InstanceView {
            id: self.id,
            organization: self.organization,
            zone: self.zone,
            image: self.image,
            status: self.status(),
            state: self.state,
            vm_state: self.vm_state,
            public_ip: self.public_ip.clone(),
            public_ip6: self.public_ip6.clone(),
            node: self.node,
            name: self.name.clone(),
            memory: self.memory,
            processors: self.processors,
            network_roles: self.network_roles.clone().unwrap_or_default(),
        }
    }

    /// Persists a new instance and adopts the identifier the store assigns.
    pub fn insert<S: DocumentStore>(
        &mut self,
        db: &mut Database<S>,
    ) -> Result<ObjectId, InstanceError> {
        if let Some(id) = self.id {
            return Err(InstanceError::DuplicateEntity(id));
        }

        let id = db.collection::<Instance>().insert(self)?;
        self.id = Some(id);
        info!(%id, name = %self.name, "instance created");
        Ok(id)
    }

    /// Writes every persistable field.
    pub fn commit<S: DocumentStore>(&self, db: &mut Database<S>) -> Result<(), InstanceError> {
        let id = self.persisted_id()?;
        db.collection::<Instance>().commit(id, self)?;
        Ok(())
    }

    /// Writes only `fields`, leaving everything else in the stored document
    /// as it is.
    pub fn commit_fields<S: DocumentStore>(
        &self,
        db: &mut Database<S>,
        fields: &FieldSet,
    ) -> Result<(), InstanceError> {
        let id = self.persisted_id()?;
        db.collection::<Instance>().commit_fields(id, self, fields)?;
        Ok(())
    }

    /// Records what the hypervisor agent reported without touching the
    /// administrative fields.
    pub fn set_vm_state<S: DocumentStore>(
        &mut self,
        db: &mut Database<S>,
        vm_state: VmState,
    ) -> Result<(), InstanceError> {
        self.vm_state = Some(vm_state);
        self.commit_fields(db, &FieldSet::from([VM_STATE]))
    }

    /// Marks the instance for deletion. Teardown happens elsewhere.
    pub fn retire<S: DocumentStore>(&mut self, db: &mut Database<S>) -> Result<(), InstanceError> {
        self.state = Some(InstanceState::Deleting);
        self.commit_fields(db, &FieldSet::from([STATE]))?;
        info!(id = ?self.id, "instance retired");
        Ok(())
    }

    /// Builds the hypervisor descriptor. Disks whose index does not parse are
    /// left out.
    pub fn get_vm(&self, disks: &[Disk], config: &HostConfig) -> VirtualMachine {
        let id = self.id.unwrap_or_else(ObjectId::nil);

        let disks = disks
            .iter()
            .filter_map(|disk| match disk.index.parse::<i64>() {
                Ok(index) => Some(VmDisk {
                    index,
                    path: vm::disk_path(&config.disk_root, disk.id),
                }),
                Err(_) => {
                    debug!(instance = %id, disk = %disk.id, index = %disk.index, "skipping disk with invalid index");
                    None
                }
            })
            .collect();

        VirtualMachine {
            id,
            image: self.image,
            processors: self.processors,
            memory: self.memory,
            disks,
            network_adapters: vec![NetworkAdapter {
                mac_address: vm::mac_address(id),
                host_interface: config.bridge_name.clone(),
            }],
        }
    }

    /// True when the running descriptor no longer matches the sizing.
    pub fn changed(&self, vm: &VirtualMachine) -> bool {
        self.memory != vm.memory || self.processors != vm.processors
    }

    fn persisted_id(&self) -> Result<ObjectId, InstanceError> {
        self.id.ok_or(InstanceError::Database(DatabaseError::NotFound))
    }
}

pub fn get<S: DocumentStore>(db: &mut Database<S>, id: ObjectId) -> Result<Instance, InstanceError> {
    Ok(db.collection::<Instance>().find_one_id(id)?)
}

pub fn get_one<S: DocumentStore>(
    db: &mut Database<S>,
    query: &Query,
) -> Result<Instance, InstanceError> {
    Ok(db.collection::<Instance>().find_one(query)?)
}

pub fn get_all<S: DocumentStore>(
    db: &mut Database<S>,
    query: &Query,
) -> Result<Vec<Instance>, InstanceError> {
    Ok(db.collection::<Instance>().find_all(query)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::fields::{select_fields, select_fields_all};
    use nimbus_storage::SqliteStorage;

    fn complete() -> Instance {
        Instance {
            organization: Some(ObjectId::new()),
            zone: Some(ObjectId::new()),
            image: Some(ObjectId::new()),
            node: Some(ObjectId::new()),
            name: "web-1".into(),
            ..Default::default()
        }
    }

    fn memory_db() -> Database<SqliteStorage> {
        Database::new(SqliteStorage::open_in_memory().unwrap())
    }

    #[test]
    fn validate_applies_floors() {
        let mut instance = Instance {
            memory: 100,
            processors: 0,
            ..complete()
        };
        instance.validate().unwrap();
        assert_eq!(instance.memory, 256);
        assert_eq!(instance.processors, 1);
        assert_eq!(instance.network_roles, Some(vec![]));
        assert_eq!(instance.state, Some(InstanceState::Running));
    }

    #[test]
    fn validate_is_idempotent() {
        let mut instance = Instance {
            memory: 2048,
            processors: 4,
            state: Some(InstanceState::Stopped),
            network_roles: Some(vec!["web".into()]),
            ..complete()
        };
        instance.validate().unwrap();
        let once = instance.clone();
        instance.validate().unwrap();
        assert_eq!(instance, once);
        assert_eq!(instance.memory, 2048);
        assert_eq!(instance.state, Some(InstanceState::Stopped));
    }

    #[test]
    fn validate_reports_every_missing_reference() {
        let mut instance = Instance::default();
        let err = instance.validate().unwrap_err();
        let codes: Vec<&str> = err.errors().iter().map(|e| e.error.as_str()).collect();
        assert_eq!(
            codes,
            vec!["organization_required", "zone_required", "node_required", "image_required"]
        );
        assert_eq!(err.primary().message, "Missing required organization");
        // defaults applied regardless
        assert_eq!(instance.memory, MIN_MEMORY);
        assert_eq!(instance.state, Some(InstanceState::Running));
    }

    #[test]
    fn validate_reports_single_missing_reference() {
        let mut instance = Instance {
            node: None,
            ..complete()
        };
        let err = instance.validate().unwrap_err();
        assert_eq!(err.errors().len(), 1);
        assert!(err.has("node_required"));
    }

    #[test]
    fn status_is_derived_not_stored() {
        let mut instance = complete();
        assert_eq!(instance.status(), None);
        instance.state = Some(InstanceState::Stopped);
        instance.vm_state = Some(VmState::Running);
        assert_eq!(instance.status(), Some(Status::Stopping));

        let names: Vec<&str> = Instance::fields().iter().map(|f| f.name).collect();
        assert!(!names.contains(&"status"));
    }

    #[test]
    fn name_only_update() {
        let instance = Instance {
            id: Some(ObjectId::new()),
            memory: 512,
            ..complete()
        };
        let update = select_fields_all(&instance, &FieldSet::from([NAME]));
        assert_eq!(update.set.len(), 1);
        assert_eq!(update.set.get(NAME), Some(&FieldValue::from("web-1")));
        assert!(update.unset.is_none());
    }

    #[test]
    fn empty_node_is_removed_not_nulled() {
        let instance = Instance {
            node: None,
            ..complete()
        };
        let update = select_fields_all(&instance, &FieldSet::from([NODE, NAME]));
        assert!(update.removes(NODE));
        assert!(!update.set.contains_key(NODE));

        let flat = select_fields(&instance, &FieldSet::from([NODE]));
        assert_eq!(flat.get(NODE), Some(&FieldValue::Null));
    }

    #[test]
    fn unset_states_are_assigned_null() {
        let instance = complete();
        let update = select_fields_all(&instance, &FieldSet::from([STATE, VM_STATE, NETWORK_ROLES]));
        assert_eq!(update.set.get(STATE), Some(&FieldValue::Null));
        assert_eq!(update.set.get(VM_STATE), Some(&FieldValue::Null));
        assert_eq!(update.set.get(NETWORK_ROLES), Some(&FieldValue::Null));
        assert!(update.unset.is_none());
    }

    #[test]
    fn insert_refuses_persisted_instance() {
        let mut db = memory_db();
        let existing = ObjectId::new();
        let mut instance = Instance {
            id: Some(existing),
            ..complete()
        };
        let err = instance.insert(&mut db).unwrap_err();
        assert!(matches!(err, InstanceError::DuplicateEntity(id) if id == existing));
        assert_eq!(db.collection::<Instance>().count().unwrap(), 0);
    }

    #[test]
    fn commit_without_id_is_not_found() {
        let mut db = memory_db();
        let instance = complete();
        assert!(instance.commit(&mut db).unwrap_err().is_not_found());
        assert!(instance
            .commit_fields(&mut db, &FieldSet::from([NAME]))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn vm_drops_unparsable_disk_indexes() {
        let instance = Instance {
            id: Some(ObjectId::new()),
            memory: 1024,
            processors: 2,
            ..complete()
        };
        let disks: Vec<Disk> = ["0", "bad", "2"]
            .into_iter()
            .map(|index| Disk {
                id: ObjectId::new(),
                index: index.to_string(),
            })
            .collect();
        let config = HostConfig::default();

        let vm = instance.get_vm(&disks, &config);
        let indexes: Vec<i64> = vm.disks.iter().map(|d| d.index).collect();
        assert_eq!(indexes, vec![0, 2]);
        assert_eq!(vm.disks[1].path, vm::disk_path(&config.disk_root, disks[2].id));
        assert_eq!(vm.image, instance.image);
        assert_eq!((vm.memory, vm.processors), (1024, 2));
    }

    #[test]
    fn vm_keeps_negative_disk_indexes() {
        let instance = Instance {
            id: Some(ObjectId::new()),
            ..complete()
        };
        let disks: Vec<Disk> = ["-1", "+3", "1.5", ""]
            .into_iter()
            .map(|index| Disk {
                id: ObjectId::new(),
                index: index.to_string(),
            })
            .collect();

        let vm = instance.get_vm(&disks, &HostConfig::default());
        let indexes: Vec<i64> = vm.disks.iter().map(|d| d.index).collect();
        assert_eq!(indexes, vec![-1, 3]);
    }

    #[test]
    fn vm_always_has_bridge_adapter() {
        let id = ObjectId::new();
        let instance = Instance {
            id: Some(id),
            ..complete()
        };
        let config = HostConfig {
            bridge_name: "br-test".into(),
            ..HostConfig::default()
        };
        let vm = instance.get_vm(&[], &config);
        assert!(vm.disks.is_empty());
        assert_eq!(
            vm.network_adapters,
            vec![NetworkAdapter {
                mac_address: vm::mac_address(id),
                host_interface: "br-test".into(),
            }]
        );
    }

    #[test]
    fn changed_tracks_sizing_only() {
        let mut instance = Instance {
            id: Some(ObjectId::new()),
            memory: 1024,
            processors: 2,
            ..complete()
        };
        let vm = instance.get_vm(&[], &HostConfig::default());
        assert!(!instance.changed(&vm));

        instance.name = "renamed".into();
        instance.image = Some(ObjectId::new());
        assert!(!instance.changed(&vm));

        instance.memory = 2048;
        assert!(instance.changed(&vm));
        instance.memory = 1024;
        instance.processors = 4;
        assert!(instance.changed(&vm));
    }

    #[test]
    fn view_carries_status() {
        let mut instance = complete();
        instance.validate().unwrap();
        let json = serde_json::to_value(instance.view()).unwrap();
        assert_eq!(json["status"], "Provisioning");
        assert_eq!(json["state"], "running");
        assert_eq!(json["network_roles"], serde_json::json!([]));
    }
}
