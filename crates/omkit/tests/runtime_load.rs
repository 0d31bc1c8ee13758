//! The runtime populating association ends through a session.

mod common;

use std::fmt;
use std::rc::Rc;

use common::{RecordingRuntime, company_metamodel};
use omkit::{
    AssociatedReference, AssociatedSet, AssociationEnd, AssociationInfo, AssociationKind,
    BidiType, CollectionOptions, ElementListener, Entity, EventRecorder, LoadEventPolicy,
    LoadPhase, MaMap, MapElementListener, ReferenceListener, SessionConfig, SessionFactory,
    SessionWrapper,
};

// ============================================================================
// Fixture
// ============================================================================

static EMPLOYEES: AssociationInfo =
    AssociationInfo::new("employees", "Department", "Employee", AssociationKind::OneToMany)
        .inverse("department");
static DEPARTMENT: AssociationInfo =
    AssociationInfo::new("department", "Employee", "Department", AssociationKind::ManyToOne)
        .inverse("employees")
        .owning(true);

#[derive(Clone)]
struct Department(Rc<DepartmentState>);

struct DepartmentState {
    name: &'static str,
    employees: AssociatedSet<Department, Employee>,
}

#[derive(Clone)]
struct Employee(Rc<EmployeeState>);

struct EmployeeState {
    name: &'static str,
    department: AssociatedReference<Employee, Department>,
}

impl Entity for Department {
    type State = DepartmentState;

    fn state(&self) -> &Rc<DepartmentState> {
        &self.0
    }

    fn from_state(state: Rc<DepartmentState>) -> Self {
        Department(state)
    }
}

impl Entity for Employee {
    type State = EmployeeState;

    fn state(&self) -> &Rc<EmployeeState> {
        &self.0
    }

    fn from_state(state: Rc<EmployeeState>) -> Self {
        Employee(state)
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name)
    }
}

impl fmt::Display for Employee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name)
    }
}

fn employees_of(d: &Department) -> &dyn AssociationEnd<Employee> {
    &d.0.employees
}

fn department_of(e: &Employee) -> &dyn AssociationEnd<Department> {
    &e.0.department
}

impl Department {
    fn new(name: &'static str) -> Self {
        Department(Rc::new_cyclic(|owner| DepartmentState {
            name,
            employees: AssociatedSet::new(owner.clone(), &EMPLOYEES, Some(department_of)),
        }))
    }

    fn names(&self) -> Vec<&'static str> {
        self.0.employees.to_vec().iter().map(|e| e.0.name).collect()
    }

    fn recorder(&self) -> EventRecorder {
        let recorder = EventRecorder::new();
        self.0
            .employees
            .add_element_listener(Rc::new(recorder.clone()) as Rc<dyn ElementListener<Employee>>);
        recorder
    }
}

impl Employee {
    fn new(name: &'static str) -> Self {
        Employee(Rc::new_cyclic(|owner| EmployeeState {
            name,
            department: AssociatedReference::new(owner.clone(), &DEPARTMENT, Some(employees_of)),
        }))
    }

    fn department(&self) -> Option<&'static str> {
        self.0.department.get().map(|d| d.0.name)
    }

    fn recorder(&self) -> EventRecorder {
        let recorder = EventRecorder::new();
        self.0
            .department
            .add_reference_listener(Rc::new(recorder.clone()) as Rc<dyn ReferenceListener<Department>>);
        recorder
    }
}

fn session(policy: LoadEventPolicy) -> SessionWrapper<RecordingRuntime> {
    let config = SessionConfig::default().load_events(policy);
    SessionFactory::new("company", company_metamodel(), config)
        .unwrap()
        .open(RecordingRuntime::default())
        .unwrap()
}

// ============================================================================
// Loading associations
// ============================================================================

#[test]
fn test_suppressed_load_wires_both_sides_silently() {
    let session = session(LoadEventPolicy::Suppress);
    let sales = Department::new("sales");
    let jim = Employee::new("jim");
    let kate = Employee::new("kate");
    let sales_log = sales.recorder();
    let jim_log = jim.recorder();

    session
        .load_collection(sales.0.employees.collection(), [jim.clone(), kate.clone()])
        .unwrap();
    assert_eq!(sales.names(), vec!["jim", "kate"]);
    assert_eq!(jim.department(), Some("sales"));
    assert_eq!(kate.department(), Some("sales"));
    assert_eq!(sales_log.take(), "");
    assert_eq!(jim_log.take(), "");
    assert_eq!(LoadPhase::current(), None);

    // Application changes after the load are heard again.
    jim.0.department.set(None).unwrap();
    assert_eq!(sales_log.take(), "detached(element=jim)");
    assert_eq!(jim_log.take(), "detached(reference=sales)");
}

#[test]
fn test_allowed_load_delivers_events() {
    let session = session(LoadEventPolicy::Allow);
    let sales = Department::new("sales");
    let jim = Employee::new("jim");
    let kate = Employee::new("kate");
    let sales_log = sales.recorder();
    let jim_log = jim.recorder();

    session
        .load_collection(sales.0.employees.collection(), [jim.clone(), kate.clone()])
        .unwrap();
    assert_eq!(sales_log.take(), "attached(element=jim)attached(element=kate)");
    assert_eq!(jim_log.take(), "attached(reference=sales)");
}

#[test]
fn test_load_moves_employee_from_previous_department() {
    let session = session(LoadEventPolicy::Suppress);
    let sales = Department::new("sales");
    let marketing = Department::new("marketing");
    let jim = Employee::new("jim");
    marketing.0.employees.add(jim.clone()).unwrap();
    let marketing_log = marketing.recorder();

    session
        .load_collection(sales.0.employees.collection(), [jim.clone()])
        .unwrap();
    assert_eq!(jim.department(), Some("sales"));
    assert!(marketing.names().is_empty());
    assert_eq!(marketing_log.take(), "");
}

#[test]
fn test_load_map_keeps_last_duplicate_value() {
    let session = session(LoadEventPolicy::Allow);
    let badges: MaMap<&str, i32> = MaMap::with_options(
        CollectionOptions::default().insertion_ordered(),
        CollectionOptions::default().bidi(BidiType::AllValues),
    )
    .unwrap();
    let log = EventRecorder::new();
    badges.add_map_element_listener(Rc::new(log.clone()) as Rc<dyn MapElementListener<&str, i32>>);

    session
        .load_map(&badges, [("jim", 7), ("kate", 7), ("dwight", 3)])
        .unwrap();
    assert_eq!(badges.entries(), vec![("kate", 7), ("dwight", 3)]);
    assert_eq!(
        log.take(),
        "attached(key=kate,value=7)attached(key=dwight,value=3)"
    );
}
