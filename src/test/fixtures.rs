//! A small protocol hierarchy shared by the unit tests.
//!
//! ```text
//! protocol Drawable { func draw() }
//! protocol Node: AnyObject
//!
//! struct Circle: Drawable
//! struct Square: Drawable
//! class  Tree: Node
//! struct Int
//! ```

use crate::ir::{
    FunctionBuilder, FunctionContext, FunctionId, FunctionSignature, Module, NominalDecl,
    NominalKind, Parameter, ParameterConvention, Protocol, ProtocolId, TypeId, TypeTable,
};

pub struct Shapes {
    pub module: Module,
    pub drawable: ProtocolId,
    pub node: ProtocolId,
    pub drawable_ty: TypeId,
    pub node_ty: TypeId,
    pub circle_ty: TypeId,
    pub square_ty: TypeId,
    pub tree_ty: TypeId,
    pub int_ty: TypeId,
    pub any_ty: TypeId,
    pub any_object_ty: TypeId,
}

impl Shapes {
    /// Declares the types; the module starts without functions.
    pub fn new() -> Self {
        let module = Module::new("shapes");
        let types = module.types();

        let drawable = types.declare_protocol(Protocol::new("Drawable").requirement("draw"));
        let node = types.declare_protocol(Protocol::new("Node").class_bound());

        let circle_ty =
            types.declare_nominal(NominalDecl::new("Circle", NominalKind::Struct).conforms(drawable));
        let square_ty =
            types.declare_nominal(NominalDecl::new("Square", NominalKind::Struct).conforms(drawable));
        let tree_ty = types.declare_nominal(NominalDecl::new("Tree", NominalKind::Class).conforms(node));
        let int_ty = types.declare_nominal(NominalDecl::new("Int", NominalKind::Struct));

        let drawable_ty = types.existential([drawable]);
        let node_ty = types.existential([node]);
        let any_ty = types.any();
        let any_object_ty = types.any_object();

        Self {
            module,
            drawable,
            node,
            drawable_ty,
            node_ty,
            circle_ty,
            square_ty,
            tree_ty,
            int_ty,
            any_ty,
            any_object_ty,
        }
    }

    pub fn types(&self) -> &TypeTable {
        self.module.types()
    }

    /// `func render(_ shape: borrowing any Drawable) { shape.draw() }`
    pub fn render(&self) -> FunctionId {
        let drawable_ty = self.drawable_ty;
        self.module
            .get_or_insert_with("render", move |_| {
                FunctionBuilder::new(
                    "render",
                    FunctionSignature::new(vec![Parameter::new(
                        drawable_ty,
                        ParameterConvention::IndirectBorrowed,
                    )]),
                )
                .build_with(|f| {
                    let shape = f.arg(0);
                    f.block(0, |b| {
                        b.witness_call(shape, "draw", &[], None);
                        b.ret(None);
                    });
                })
            })
            .0
    }

    /// `func attach(_ node: any Node)`
    pub fn attach(&self) -> FunctionId {
        let node_ty = self.node_ty;
        self.module
            .get_or_insert_with("attach", move |_| {
                FunctionBuilder::new(
                    "attach",
                    FunctionSignature::new(vec![Parameter::new(node_ty, ParameterConvention::ByValue)]),
                )
                .build_with(|f| f.block(0, |b| b.ret(None)))
            })
            .0
    }

    /// Adds a definition with the given parameters and body.
    pub fn define<F>(&self, name: &str, params: Vec<Parameter>, f: F) -> FunctionId
    where
        F: FnOnce(&mut FunctionContext<'_>),
    {
        let function = FunctionBuilder::new(name, FunctionSignature::new(params)).build_with(f);
        self.module
            .add_function(function)
            .expect("fixture function names are unique")
    }
}
