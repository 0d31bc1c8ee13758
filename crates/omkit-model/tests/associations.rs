//! Bidirectional association scenarios across reference, set and list ends.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use omkit_collection::{ElementEvent, ElementListener, EventRecorder, ListElementListener};
use omkit_core::{PropertyVersion, Result};
use omkit_model::{
    AssociatedList, AssociatedReference, AssociatedSet, AssociationEnd, AssociationInfo,
    AssociationKind, AssociationRegistry, DuplicatePolicy, Entity, ReferenceListener,
};

// ============================================================================
// Department / Employee
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

#[test]
fn test_adding_to_collection_sets_reference() {
    let sales = Department::new("sales");
    let jim = Employee::new("jim");
    let log = jim.recorder();
    sales.0.employees.add(jim.clone()).unwrap();
    assert_eq!(jim.department(), Some("sales"));
    assert_eq!(log.take(), "attached(reference=sales)");
}

#[test]
fn test_setting_reference_moves_between_collections() {
    let sales = Department::new("sales");
    let market = Department::new("market");
    let jim = Employee::new("jim");
    sales.0.employees.add(jim.clone()).unwrap();

    let order = Rc::new(RefCell::new(Vec::new()));
    for dept in [&sales, &market] {
        let sink = Rc::clone(&order);
        let name = dept.0.name;
        let listener: Rc<dyn ElementListener<Employee>> =
            Rc::new(move |e: &ElementEvent<Employee>| -> Result<()> {
                let implicit = e.is_implicit(PropertyVersion::Attach)
                    || e.is_implicit(PropertyVersion::Detach);
                sink.borrow_mut().push(format!("{name}:{e}:{implicit}"));
                Ok(())
            });
        dept.0.employees.add_element_listener(listener);
    }

    jim.0.department.set(Some(market.clone())).unwrap();
    assert_eq!(sales.names(), Vec::<&str>::new());
    assert_eq!(market.names(), vec!["jim"]);
    assert_eq!(
        *order.borrow(),
        vec!["sales:detached(element=jim):true", "market:attached(element=jim):true"]
    );
}

#[test]
fn test_add_all_steals_from_other_department() {
    let sales = Department::new("sales");
    let market = Department::new("market");
    let jim = Employee::new("jim");
    let kate = Employee::new("kate");
    let bob = Employee::new("bob");
    sales.0.employees.add_all([jim.clone(), kate.clone()]).unwrap();
    market.0.employees.add(bob.clone()).unwrap();

    let sales_log = sales.recorder();
    let kate_log = kate.recorder();
    market.0.employees.add_all([kate.clone(), jim.clone()]).unwrap();

    assert_eq!(sales.names(), Vec::<&str>::new());
    assert_eq!(market.names(), vec!["bob", "kate", "jim"]);
    assert_eq!(kate.department(), Some("market"));
    assert_eq!(sales_log.take(), "detached(element=kate)detached(element=jim)");
    assert_eq!(kate_log.take(), "detached(reference=sales)attached(reference=market)");
}

#[test]
fn test_cursor_remove_clears_reference() {
    let sales = Department::new("sales");
    let jim = Employee::new("jim");
    let kate = Employee::new("kate");
    sales.0.employees.add_all([jim.clone(), kate.clone()]).unwrap();

    let mut cursor = sales.0.employees.cursor();
    while let Some(e) = cursor.next().unwrap() {
        if e.same(&jim) {
            cursor.remove().unwrap();
        }
    }
    assert_eq!(jim.department(), None);
    assert_eq!(kate.department(), Some("sales"));
    assert_eq!(sales.names(), vec!["kate"]);
}

#[test]
fn test_clearing_reference_removes_from_collection() {
    let sales = Department::new("sales");
    let jim = Employee::new("jim");
    jim.0.department.set(Some(sales.clone())).unwrap();
    assert_eq!(sales.names(), vec!["jim"]);

    let log = sales.recorder();
    jim.0.department.set(None).unwrap();
    assert!(sales.0.employees.is_empty());
    assert_eq!(log.take(), "detached(element=jim)");
}

#[test]
fn test_clear_nulls_every_reference() {
    let sales = Department::new("sales");
    let staff = [Employee::new("jim"), Employee::new("kate"), Employee::new("bob")];
    sales.0.employees.add_all(staff.iter().cloned()).unwrap();
    sales.0.employees.clear().unwrap();
    assert!(staff.iter().all(|e| e.department().is_none()));
}

#[test]
fn test_set_end_reports_its_owner_while_alive() {
    let jim = Employee::new("jim");
    let sales = Department::new("sales");
    sales.0.employees.add(jim.clone()).unwrap();
    assert!(sales.0.employees.owner().is_some_and(|owner| owner.same(&sales)));

    // An end built without an owner has none.
    let orphan = AssociatedSet::<Department, Employee>::new(std::rc::Weak::new(), &EMPLOYEES, None);
    assert!(orphan.owner().is_none());
}

#[test]
fn test_reference_keeps_target_alive() {
    let jim = Employee::new("jim");
    {
        let temp = Department::new("temp");
        jim.0.department.set(Some(temp.clone())).unwrap();
    }
    // The reference keeps the department alive.
    assert_eq!(jim.department(), Some("temp"));
    jim.0.department.set(None).unwrap();
    assert_eq!(jim.department(), None);
}

#[test]
fn test_registry_accepts_department_model() {
    let registry = AssociationRegistry::new()
        .with(&EMPLOYEES)
        .and_then(|r| r.with(&DEPARTMENT))
        .unwrap();
    registry.validate().unwrap();
    assert_eq!(registry.inverse_of(&DEPARTMENT), Some(&EMPLOYEES));
}

fn move_jim_to_sales() -> String {
    let sales = Department::new("sales");
    let marketing = Department::new("marketing");
    let jim = Employee::new("jim");
    marketing.0.employees.add(jim.clone()).unwrap();

    let log = EventRecorder::new();
    for dept in [&sales, &marketing] {
        dept.0
            .employees
            .add_element_listener(Rc::new(log.clone()) as Rc<dyn ElementListener<Employee>>);
    }
    jim.0
        .department
        .add_reference_listener(Rc::new(log.clone()) as Rc<dyn ReferenceListener<Department>>);

    sales.0.employees.add(jim.clone()).unwrap();
    assert_eq!(jim.department(), Some("sales"));
    assert!(marketing.names().is_empty());
    log.take()
}

#[test]
fn test_mirrors_deliver_in_join_order_without_registry() {
    assert_eq!(
        move_jim_to_sales(),
        "attached(element=jim)detached(reference=marketing)attached(reference=sales)detached(element=jim)"
    );
}

#[test]
fn test_active_registry_orders_mirrors_by_declaration() {
    let _active = AssociationRegistry::new()
        .with(&EMPLOYEES)
        .and_then(|r| r.with(&DEPARTMENT))
        .and_then(|r| r.activate())
        .unwrap();
    assert_eq!(
        move_jim_to_sales(),
        "attached(element=jim)detached(element=jim)detached(reference=marketing)attached(reference=sales)"
    );
}

// ============================================================================
// Student / Course
// ============================================================================

static COURSES: AssociationInfo =
    AssociationInfo::new("courses", "Student", "Course", AssociationKind::ManyToMany)
        .inverse("students")
        .owning(true);
static STUDENTS: AssociationInfo =
    AssociationInfo::new("students", "Course", "Student", AssociationKind::ManyToMany)
        .inverse("courses");

#[derive(Clone)]
struct Student(Rc<StudentState>);

struct StudentState {
    name: &'static str,
    courses: AssociatedSet<Student, Course>,
}

#[derive(Clone)]
struct Course(Rc<CourseState>);

struct CourseState {
    name: &'static str,
    students: AssociatedSet<Course, Student>,
}

impl Entity for Student {
    type State = StudentState;

    fn state(&self) -> &Rc<StudentState> {
        &self.0
    }

    fn from_state(state: Rc<StudentState>) -> Self {
        Student(state)
    }
}

impl Entity for Course {
    type State = CourseState;

    fn state(&self) -> &Rc<CourseState> {
        &self.0
    }

    fn from_state(state: Rc<CourseState>) -> Self {
        Course(state)
    }
}

fn courses_of(s: &Student) -> &dyn AssociationEnd<Course> {
    &s.0.courses
}

fn students_of(c: &Course) -> &dyn AssociationEnd<Student> {
    &c.0.students
}

fn student(name: &'static str) -> Student {
    Student(Rc::new_cyclic(|owner| StudentState {
        name,
        courses: AssociatedSet::new(owner.clone(), &COURSES, Some(students_of)),
    }))
}

fn course(name: &'static str) -> Course {
    Course(Rc::new_cyclic(|owner| CourseState {
        name,
        students: AssociatedSet::new(owner.clone(), &STUDENTS, Some(courses_of)),
    }))
}

#[test]
fn test_many_to_many_mirrors_both_sets() {
    let ann = student("ann");
    let ben = student("ben");
    let math = course("math");
    let art = course("art");

    ann.0.courses.add_all([math.clone(), art.clone()]).unwrap();
    math.0.students.add(ben.clone()).unwrap();

    let math_students: Vec<_> = math.0.students.to_vec().iter().map(|s| s.0.name).collect();
    assert_eq!(math_students, vec!["ann", "ben"]);
    assert!(art.0.students.contains(&ann));
    assert!(ben.0.courses.contains(&math));

    math.0.students.remove(&ann).unwrap();
    let ann_courses: Vec<_> = ann.0.courses.to_vec().iter().map(|c| c.0.name).collect();
    assert_eq!(ann_courses, vec!["art"]);

    ann.0.courses.retain(|_| false).unwrap();
    assert!(art.0.students.is_empty());
    assert!(ben.0.courses.contains(&math));
}

// ============================================================================
// Playlist / Track
// ============================================================================

static TRACKS: AssociationInfo =
    AssociationInfo::new("tracks", "Playlist", "Track", AssociationKind::OneToMany)
        .inverse("playlist");
static STRICT_TRACKS: AssociationInfo =
    AssociationInfo::new("strict_tracks", "Playlist", "Track", AssociationKind::OneToMany)
        .duplicates(DuplicatePolicy::Reject);
static PLAYLIST: AssociationInfo =
    AssociationInfo::new("playlist", "Track", "Playlist", AssociationKind::ManyToOne)
        .inverse("tracks");

#[derive(Clone)]
struct Playlist(Rc<PlaylistState>);

struct PlaylistState {
    tracks: AssociatedList<Playlist, Track>,
    strict_tracks: AssociatedList<Playlist, Track>,
}

#[derive(Clone)]
struct Track(Rc<TrackState>);

struct TrackState {
    title: &'static str,
    playlist: AssociatedReference<Track, Playlist>,
}

impl Entity for Playlist {
    type State = PlaylistState;

    fn state(&self) -> &Rc<PlaylistState> {
        &self.0
    }

    fn from_state(state: Rc<PlaylistState>) -> Self {
        Playlist(state)
    }
}

impl Entity for Track {
    type State = TrackState;

    fn state(&self) -> &Rc<TrackState> {
        &self.0
    }

    fn from_state(state: Rc<TrackState>) -> Self {
        Track(state)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.title)
    }
}

fn tracks_of(p: &Playlist) -> &dyn AssociationEnd<Track> {
    &p.0.tracks
}

fn playlist_of(t: &Track) -> &dyn AssociationEnd<Playlist> {
    &t.0.playlist
}

fn playlist() -> Playlist {
    Playlist(Rc::new_cyclic(|owner| PlaylistState {
        tracks: AssociatedList::new(owner.clone(), &TRACKS, Some(playlist_of)),
        strict_tracks: AssociatedList::new(owner.clone(), &STRICT_TRACKS, None),
    }))
}

fn track(title: &'static str) -> Track {
    Track(Rc::new_cyclic(|owner| TrackState {
        title,
        playlist: AssociatedReference::new(owner.clone(), &PLAYLIST, Some(tracks_of)),
    }))
}

fn titles(list: &AssociatedList<Playlist, Track>) -> Vec<&'static str> {
    list.to_vec().iter().map(|t| t.0.title).collect()
}

#[test]
fn test_list_end_moves_duplicate_and_mirrors() {
    let p = playlist();
    let a = track("a");
    let b = track("b");
    let c = track("c");
    p.0.tracks.push(a.clone()).unwrap();
    p.0.tracks.push(b.clone()).unwrap();
    c.0.playlist.set(Some(p.clone())).unwrap();
    assert_eq!(titles(&p.0.tracks), vec!["a", "b", "c"]);

    let log = EventRecorder::new();
    p.0.tracks
        .add_list_element_listener(Rc::new(log.clone()) as Rc<dyn ListElementListener<Track>>);
    p.0.tracks.insert(0, c.clone()).unwrap();
    assert_eq!(titles(&p.0.tracks), vec!["c", "a", "b"]);
    assert_eq!(log.take(), "detached(index=2,element=c)attached(index=0,element=c)");
    assert!(c.0.playlist.is(&p));

    p.0.tracks.remove_at(1).unwrap();
    assert!(a.0.playlist.get().is_none());
    assert_eq!(titles(&p.0.tracks), vec!["c", "b"]);

    assert!(p.0.tracks.owner().is_some_and(|owner| owner.same(&p)));
}

#[test]
fn test_list_reject_policy() {
    let p = playlist();
    let a = track("a");
    let b = track("b");
    p.0.strict_tracks.push(a.clone()).unwrap();
    p.0.strict_tracks.push(b.clone()).unwrap();

    let err = p.0.strict_tracks.push(a.clone()).unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(err.to_string().contains("Playlist.strict_tracks"));
    assert_eq!(titles(&p.0.strict_tracks), vec!["a", "b"]);

    // Writing an element back at its own index is not a duplicate.
    p.0.strict_tracks.set(0, a.clone()).unwrap();
    assert!(p.0.strict_tracks.set(1, a.clone()).is_err());
    // Unidirectional: the track never learns about the list.
    assert!(a.0.playlist.get().is_none());
}
