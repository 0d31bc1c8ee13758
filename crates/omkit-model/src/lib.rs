//! Self-mirroring associations for omkit.
//!
//! `omkit-model` is the **association layer**. It lets plain domain types
//! hold references, sets and lists of each other that keep both sides of a
//! bidirectional association consistent.
//!
//! # Role In The Architecture
//!
//! - **Descriptors**: [`AssociationInfo`] is a `static` description of one
//!   end; [`AssociationRegistry`] checks that inverses agree.
//! - **Ends**: [`AssociatedReference`], [`AssociatedSet`] and
//!   [`AssociatedList`] are fields of an entity's state. Each knows its
//!   owner (weakly) and how to reach the opposite end on a target
//!   ([`Mirror`]).
//! - **Propagation**: changing one end links or unlinks the opposite end,
//!   inside the same batch. The opposite side's events are implicit. While
//!   a registry is active ([`AssociationRegistry::activate`]), mirrored
//!   ends deliver in descriptor declaration order.
//!
//! An entity is a newtype around `Rc` of its state, built with
//! `Rc::new_cyclic` so the ends can hold the owner link:
//!
//! ```
//! use std::rc::Rc;
//! use omkit_model::{
//!     AssociatedReference, AssociatedSet, AssociationEnd, AssociationInfo, AssociationKind,
//!     Entity,
//! };
//!
//! static EMPLOYEES: AssociationInfo =
//!     AssociationInfo::new("employees", "Department", "Employee", AssociationKind::OneToMany)
//!         .inverse("department");
//! static DEPARTMENT: AssociationInfo =
//!     AssociationInfo::new("department", "Employee", "Department", AssociationKind::ManyToOne)
//!         .inverse("employees");
//!
//! #[derive(Clone)]
//! struct Department(Rc<DepartmentState>);
//! struct DepartmentState {
//!     employees: AssociatedSet<Department, Employee>,
//! }
//!
//! #[derive(Clone)]
//! struct Employee(Rc<EmployeeState>);
//! struct EmployeeState {
//!     department: AssociatedReference<Employee, Department>,
//! }
//!
//! impl Entity for Department {
//!     type State = DepartmentState;
//!     fn state(&self) -> &Rc<DepartmentState> { &self.0 }
//!     fn from_state(state: Rc<DepartmentState>) -> Self { Department(state) }
//! }
//!
//! impl Entity for Employee {
//!     type State = EmployeeState;
//!     fn state(&self) -> &Rc<EmployeeState> { &self.0 }
//!     fn from_state(state: Rc<EmployeeState>) -> Self { Employee(state) }
//! }
//!
//! fn employees_of(d: &Department) -> &dyn AssociationEnd<Employee> { &d.0.employees }
//! fn department_of(e: &Employee) -> &dyn AssociationEnd<Department> { &e.0.department }
//!
//! let sales = Department(Rc::new_cyclic(|owner| DepartmentState {
//!     employees: AssociatedSet::new(owner.clone(), &EMPLOYEES, Some(department_of)),
//! }));
//! let jim = Employee(Rc::new_cyclic(|owner| EmployeeState {
//!     department: AssociatedReference::new(owner.clone(), &DEPARTMENT, Some(employees_of)),
//! }));
//!
//! sales.0.employees.add(jim.clone()).unwrap();
//! assert!(jim.0.department.is(&sales));
//!
//! jim.0.department.set(None).unwrap();
//! assert!(sales.0.employees.is_empty());
//! ```

pub mod entity;
pub mod info;
pub mod list;
pub mod reference;
pub mod registry;
pub mod set;

pub use entity::{AssociationEnd, Entity, EntityComparator, Mirror};
pub use info::{AssociationInfo, AssociationKind, DuplicatePolicy};
pub use list::AssociatedList;
pub use reference::{AssociatedReference, ReferenceEvent, ReferenceListener};
pub use registry::{ActiveRegistry, AssociationRegistry};
pub use set::AssociatedSet;
